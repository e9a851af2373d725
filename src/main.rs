use std::process::ExitCode;

fn main() -> ExitCode {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    match attrition_stack::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
