use udp_ingest_metrics::config::Config;
use udp_ingest_metrics::exposition;
use udp_ingest_metrics::{InputMetrics, Registry};

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info};

use std::net::SocketAddr;
use std::time::Instant;

fn main() {
    // custom panic hook to terminate whole process after unwinding
    std::panic::set_hook(Box::new(|s| {
        eprintln!("{s}");
        std::process::exit(101);
    }));

    // parse command line options
    let matches = Command::new(env!("CARGO_BIN_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_about(
            "Receives UDP datagrams and reports ingestion health: packet and \
            byte counts, inter-arrival and processing times, and the socket's \
            receive queue length and drops as seen by the kernel.",
        )
        .arg(
            Arg::new("CONFIG")
                .help("Configuration file")
                .action(ArgAction::Set)
                .required(true)
                .index(1),
        )
        .get_matches();

    let Some(file) = matches.get_one::<String>("CONFIG") else {
        eprintln!("no config file provided");
        std::process::exit(1);
    };

    // load config from file
    let config = match Config::load(file) {
        Ok(c) => c,
        Err(error) => {
            eprintln!("error loading config file: {file}\n{error}");
            std::process::exit(1);
        }
    };

    // configure debug log
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(config.log().level()))
        .with_writer(std::io::stderr)
        .init();

    debug!("loaded config: {file}");

    // initialize async runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(1)
        .thread_name("udp-ingest")
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to launch async runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(run(config)) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let general = config.general();

    let socket = UdpSocket::bind(general.listen())
        .await
        .with_context(|| format!("failed to bind udp socket on {}", general.listen()))?;

    info!("starting udp socket input on {}", general.listen());

    let registry = Registry::new();

    // resolving the listen address for the stats poller can block
    let metrics = {
        let registry = registry.clone();
        let settings = general.input_settings();
        tokio::task::spawn_blocking(move || InputMetrics::new(&registry, &settings)).await?
    };

    if !metrics.is_enabled() {
        info!("no input id configured, udp input metrics are disabled");
    }

    let (shutdown, mut stopped) = watch::channel(false);

    let exposition_task = if config.exposition().enabled() {
        let listen = config.exposition().listen()?;
        let registry = registry.clone();

        Some(tokio::spawn(exposition::http::serve(
            listen,
            registry,
            async move {
                let _ = stopped.changed().await;
            },
        )))
    } else {
        None
    };

    let result = receive(&socket, general.max_message_size(), &metrics).await;

    let _ = shutdown.send(true);

    if let Some(task) = exposition_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("metrics exposition failed: {e}"),
            Err(e) => error!("metrics exposition task failed: {e}"),
        }
    }

    // closing waits for the stats poller thread to exit
    tokio::task::spawn_blocking(move || metrics.close()).await?;

    info!("udp input stopped");

    result
}

/// Receive datagrams until interrupted, publishing each one and then
/// recording it in `metrics`.
async fn receive(
    socket: &UdpSocket,
    max_message_size: usize,
    metrics: &InputMetrics,
) -> anyhow::Result<()> {
    let mut buf = vec![0; max_message_size];

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            result = &mut interrupt => {
                result.context("failed to listen for interrupt")?;
                info!("shutdown signaled");
                return Ok(());
            }
            received = socket.recv_from(&mut buf) => {
                let (len, source) = received.context("failed to receive datagram")?;
                let receipt = Instant::now();
                let packet = &buf[..len];

                // a datagram that filled the whole buffer may have been cut
                // short by the kernel
                publish(packet, source, len == buf.len());

                // must come after publishing to measure processing time
                metrics.record(packet, receipt);
            }
        }
    }
}

fn publish(packet: &[u8], source: SocketAddr, truncated: bool) {
    debug!(
        message = %String::from_utf8_lossy(packet),
        source.address = %source,
        truncated,
        "event"
    );
}
