use std::error::Error;
use vergen::EmitBuilder;

fn main() -> Result<(), Box<dyn Error>> {
    let emitted = EmitBuilder::builder()
        .fail_on_error()
        .all_git()
        .git_describe(true, true, None)
        .emit();
    if emitted.is_err() {
        // Not a git checkout (e.g. a source tarball)
        println!("cargo:rustc-env=VERGEN_GIT_DESCRIBE=unknown");
    }
    Ok(())
}
