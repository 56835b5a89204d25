use qjs_rs::runtime::Driver;
use qjs_rs_errors::Result;
use qjs_rs_utils::config::ConfigBuilder;

pub const FIXTURES: &str = "tests/fixtures";

pub fn fixture_path(name: &str) -> String {
    format!("{FIXTURES}/{name}")
}

/// Run a fixture file the way `qjs <file>` would.
pub fn run_fixture(name: &str) -> Result<()> {
    run_with(ConfigBuilder::default().script_path(fixture_path(name)))
}

pub fn run_with(builder: &mut ConfigBuilder) -> Result<()> {
    Driver::new(builder.build().unwrap()).run()
}
