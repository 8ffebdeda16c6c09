pub mod assemble;
pub mod call;
