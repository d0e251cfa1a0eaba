use clap::{Parser, Subcommand};
use log::{error, info, warn};
use orasocks::configuration::config::Config;
use orasocks::control_surface::default_connector;
use orasocks::controller::{Controller, ControllerSettings, LogSink};
use orasocks::relay::{RelayServer, RelaySettings};
use std::path::Path;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "orasocks")]
#[command(version)]
#[command(about = "Deploys and controls a SOCKS5 relay inside an Oracle database JVM")]
struct Args {
    /// Path to the TOML configuration file
    config_file: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a control session and report the host version and privileges
    Verify {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Deploy and start the relay, then stop it on Ctrl-C
    Serve {
        /// Remote listener port, overriding `proxy.port`
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run the relay engine on this machine
    Relay {
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(short, long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();

    if args.config_file.is_empty() {
        error!("No configuration file given");
        std::process::exit(1);
    }

    let config = match Config::from_file(Path::new(args.config_file.as_str())) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration from file: {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration imported successfully");

    let code = match args.command {
        Command::Verify { json } => verify(&config, json).await,
        Command::Serve { port } => serve(&config, port.unwrap_or(config.proxy.port)).await,
        Command::Relay { port, bind } => {
            let bind = bind.unwrap_or_else(|| config.relay.bind_address.clone());
            relay(&config, &bind, port.unwrap_or(config.relay.port)).await
        }
    };
    std::process::exit(code);
}

fn build_controller(config: &Config) -> Option<Controller> {
    match ControllerSettings::from_config(config) {
        Ok(settings) => Some(Controller::new(
            default_connector(),
            settings,
            LogSink::detached(),
        )),
        Err(e) => {
            error!("Unable to prepare the relay payload: {}", e);
            None
        }
    }
}

async fn verify(config: &Config, json: bool) -> i32 {
    let Some(controller) = build_controller(config) else {
        return 1;
    };
    let profile = match config.profile() {
        Ok(profile) => profile,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    match controller.verify_connection(profile).await {
        Ok(report) => {
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(out) => println!("{}", out),
                    Err(e) => {
                        error!("Unable to serialize report: {}", e);
                        return 1;
                    }
                }
            } else {
                println!("version:        {}", report.version);
                println!("alter system:   {}", report.has_privilege);
                println!("descriptor:     {}", report.descriptor);
                println!("session:        {}", report.client_identifier);
            }
            0
        }
        Err(e) => {
            error!("Verification failed: {}", e);
            1
        }
    }
}

async fn serve(config: &Config, port: u16) -> i32 {
    let Some(controller) = build_controller(config) else {
        return 1;
    };
    let profile = match config.profile() {
        Ok(profile) => profile,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    if let Err(e) = controller.verify_connection(profile).await {
        error!("Verification failed: {}", e);
        return 1;
    }
    if let Err(e) = controller.start(port).await {
        error!("Unable to start the relay: {}", e);
        controller.stop().await;
        return 1;
    }

    info!("Relay running on remote port {}; press Ctrl-C to stop", port);
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for Ctrl-C: {}", e);
    }

    if controller.stop().await {
        info!("Relay stopped");
        0
    } else {
        warn!("No relay context was verified terminated");
        1
    }
}

async fn relay(config: &Config, bind: &str, port: u16) -> i32 {
    let addr = format!("{}:{}", bind, port);
    let settings = RelaySettings::from(&config.relay);
    let server = match RelayServer::bind(&addr, settings, CancellationToken::new()).await {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };
    let handle = match server.spawn() {
        Ok(handle) => handle,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for Ctrl-C: {}", e);
    }
    info!("Shutting down relay on {}", handle.local_addr());
    match handle.stop().await {
        Ok(()) => 0,
        Err(e) => {
            error!("{}", e);
            1
        }
    }
}
