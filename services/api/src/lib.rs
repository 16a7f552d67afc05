mod cli;
mod demo;
mod infra;
mod roster;
mod routes;
mod server;

use faculty_flow::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
