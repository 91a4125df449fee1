use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    dism_kit::run()
}
