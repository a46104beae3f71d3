//! edge-trust - edge gateway, authorization service and internal service roles
//!
//! One binary, one role per process.

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use axum::Router;
use clap::{CommandFactory, Parser};
use tracing::{error, info};

use edge_trust::{
    authorization::{self, AuthState},
    cli::{Cli, Command},
    config::{Config, Role},
    gateway::{self, GatewayState},
    server, service,
    service::RobotGate,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Command::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "edge-trust", &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Gateway => run_role(&config, Role::Gateway).await,
        Command::Auth => run_role(&config, Role::Authorization).await,
        Command::Service => run_role(&config, Role::Service).await,
        Command::CheckConfig { ref role } => check_config(&config, role),
        Command::Completions { .. } => ExitCode::SUCCESS,
    }
}

fn parse_role(name: &str) -> Option<Role> {
    match name {
        "gateway" => Some(Role::Gateway),
        "auth" | "authorization" => Some(Role::Authorization),
        "service" => Some(Role::Service),
        _ => None,
    }
}

/// Validate the configuration for a role and load its key material.
fn check_config(config: &Config, role: &str) -> ExitCode {
    let Some(role) = parse_role(role) else {
        eprintln!("Unknown role '{role}' (expected gateway, auth or service)");
        return ExitCode::FAILURE;
    };

    match config.validate_for(role).and_then(|()| build_router(config, role)) {
        Ok(_) => {
            println!("Configuration OK for {role}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Configuration invalid for {role}: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_router(config: &Config, role: Role) -> edge_trust::Result<Router> {
    match role {
        Role::Gateway => {
            let state = GatewayState::from_config(config)?;
            info!(
                routes = state.routes.len(),
                login_path = %state.login_path,
                "Gateway routes loaded"
            );
            Ok(gateway::create_router(state))
        }
        Role::Authorization => {
            let gate = Arc::new(RobotGate::from_config(config)?);
            let state = Arc::new(AuthState::from_config(config)?);
            Ok(authorization::create_router(
                state,
                gate,
                &config.authorization.login_path,
            ))
        }
        Role::Service => {
            let gate = Arc::new(RobotGate::from_config(config)?);
            Ok(service::create_router(gate))
        }
    }
}

async fn run_role(config: &Config, role: Role) -> ExitCode {
    if let Err(e) = config.validate_for(role) {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    let app = match build_router(config, role) {
        Ok(app) => server::with_common_layers(app, config.server.max_body_size),
        Err(e) => {
            error!("Failed to start {role}: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server::serve(app, &config.server, role).await {
        error!("{role} error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
