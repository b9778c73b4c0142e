use clap::Parser;
use imagist::config::Config;
use imagist::proxy::ImagistProxy;
use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;
use std::path::PathBuf;

/// Imagist - streaming image transformation proxy built with Cloudflare's Pingora
#[derive(Parser, Debug)]
#[command(name = "imagist")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Daemon mode
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,

    /// Upgrade workers gracefully
    #[arg(long)]
    upgrade: bool,
}

fn main() {
    let args = Args::parse();

    let config = Config::from_file(&args.config).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    if args.test {
        println!("Configuration {} is valid", args.config.display());
        return;
    }

    if let Err(e) = imagist::logging::init_subscriber(&config.logging) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        base_host = config.source.base_host.as_deref().unwrap_or("-"),
        allowed_hosts = config.source.allowed_hosts.len(),
        local_root = config.source.local_root.is_some(),
        "Configuration loaded successfully"
    );

    let opt = Opt {
        daemon: args.daemon,
        upgrade: args.upgrade,
        ..Default::default()
    };

    let mut server = Server::new(Some(opt)).unwrap_or_else(|e| {
        eprintln!("Failed to create Pingora server: {}", e);
        std::process::exit(1);
    });
    server.bootstrap();

    let proxy = ImagistProxy::new(&config).unwrap_or_else(|e| {
        eprintln!("Failed to initialize image proxy: {}", e);
        std::process::exit(1);
    });

    let mut proxy_service = pingora_proxy::http_proxy_service(&server.configuration, proxy);
    proxy_service.threads = Some(config.server.threads);

    let listen_addr = config.server.listen_addr();
    proxy_service.add_tcp(&listen_addr);

    tracing::info!(
        address = %listen_addr,
        threads = config.server.threads,
        "Starting Imagist image proxy"
    );

    server.add_service(proxy_service);
    server.run_forever();
}
