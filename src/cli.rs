use crate::commands;

pub fn run(args: Vec<String>) -> Result<String, String> {
    commands::run_cli(args)
}
