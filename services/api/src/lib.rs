mod cli;
mod demo;
mod infra;
mod ops;
mod routes;
mod server;

use sitter_srs::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
