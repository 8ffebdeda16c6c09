use crate::utils::Result;

pub fn output_path(output_prefix: &str, output_suffix: &str) -> String {
    format!("{}.{}", output_prefix, output_suffix)
}

pub fn create_writer<T, F>(output_prefix: &str, output_suffix: &str, f: F) -> Result<T>
where
    F: FnOnce(&str) -> Result<T>,
{
    f(&output_path(output_prefix, output_suffix))
}
