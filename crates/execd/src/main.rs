//! # execd
//!
//! In-sandbox command execution daemon.
//!
//! ## Overview
//!
//! This server provides MCP tools for:
//! - Running shell commands in the foreground (output returned per record)
//! - Running shell commands in the background (polled by session id)
//! - Status queries and cursor-based output reads
//! - Interrupting running commands
//!
//! ## Architecture
//!
//! This is the top layer - the binary that ties together:
//! - execd-core: Core types, errors and configuration
//! - execd-runtime: Capture, tailing, registry and the execution engine

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};

use execd::{Cli, ExecdServer};
use execd_core::ServerConfig;
use execd_runtime::{EngineConfig, ExecutionEngine, InMemoryRegistry, OutputCapture, RetentionPolicy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Cli::parse();

    let config = match &args.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    config.validate().context("invalid configuration")?;

    // Initialize logging. stdout belongs to the stdio transport.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level)),
        )
        .init();

    tracing::info!("execd v{} starting...", env!("CARGO_PKG_VERSION"));

    if config.server.transport != "stdio" {
        anyhow::bail!("unsupported transport: {}", config.server.transport);
    }

    let output_dir = config.execution.resolved_output_dir();
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create output dir {}", output_dir.display()))?;
    tracing::info!(
        "Capturing output under {} with shell {}",
        output_dir.display(),
        config.execution.shell
    );

    let engine = ExecutionEngine::new(
        Arc::new(InMemoryRegistry::new()),
        OutputCapture::new(output_dir),
        EngineConfig::from(&config.execution),
    );

    let policy = RetentionPolicy::from(&config.retention);
    let sweeper = policy.is_enabled().then(|| {
        tracing::info!("Retention sweeper enabled: {:?}", policy);
        engine.spawn_retention_sweeper(policy.clone(), config.retention.sweep_interval())
    });

    let server = ExecdServer::new(engine);

    tracing::info!("Server initialized, starting stdio transport...");

    // Serve the MCP server over stdio
    let service = server.serve(stdio()).await.map_err(|e| {
        tracing::error!("Error starting server: {}", e);
        e
    })?;

    tracing::info!("execd running on stdio");

    // Wait for the service to complete
    service.waiting().await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    tracing::info!("execd shutting down");

    Ok(())
}
