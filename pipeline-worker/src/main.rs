//! Pipeline Worker Main Entry Point
//!
//! Runs one pipeline: consumes its input topic, indexes every record into
//! OpenSearch and republishes it exactly once.

use dotenv::dotenv;
use pipeline_worker::{Dependencies, IndexingError};
use std::env;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
fn init_tracing() -> Result<(), IndexingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("pipeline_worker=info,pipeline_kafka=info,pipeline_repository=info")
    });

    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        // Structured logging for log shippers
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()
            .map_err(|e| IndexingError::config(format!("Failed to initialize tracing: {}", e)))?;

        info!(
            service_name = "pipeline-worker",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with JSON format"
        );
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .try_init()
            .map_err(|e| IndexingError::config(format!("Failed to initialize tracing: {}", e)))?;

        info!(
            service_name = "pipeline-worker",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with console output"
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing()?;

    let mut deps = match Dependencies::new().await {
        Ok(deps) => deps,
        Err(e) => {
            error!(error = %e, "Failed to initialize pipeline worker");
            return Err(e);
        }
    };

    let pipeline = deps.pipeline.clone();
    info!(
        pipeline_id = %pipeline.pipeline_id,
        input_topic = %pipeline.input_topic,
        output_topic = %pipeline.output_topic,
        error_topic = %pipeline.error_topic,
        consumer_group = %pipeline.consumer_group_id(),
        transactional_id = %deps.transactional_id,
        "Pipeline worker consuming"
    );

    match deps.orchestrator.run().await {
        Ok(()) => {
            info!(
                pipeline_id = %pipeline.pipeline_id,
                "Pipeline worker stopped; records past the last committed transaction are re-read on restart"
            );
            Ok(())
        }
        Err(e) => {
            error!(
                pipeline_id = %pipeline.pipeline_id,
                input_topic = %pipeline.input_topic,
                error = %e,
                "Pipeline worker stopped on error; the open transaction is fenced on restart"
            );
            Err(e.into())
        }
    }
}
