pub mod allocator;
pub mod cli;
pub mod compile_time_config;
pub mod eval;
pub mod host;
pub mod repl;
pub mod runtime;

#[cfg(test)]
pub mod test_support;
