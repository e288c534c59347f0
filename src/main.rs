//! CLI for mqsim
//!
//! Subcommands:
//! - `demo`: run virtual sensors and a monitor against one broker
//! - `stats`: publish a short burst and dump the broker state

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mqsim::broker::{Broker, BrokerRegistry, Message, QoS};
use mqsim::client::{Client, ConnectOptions};
use mqsim::config::{Settings, load_config};
use mqsim::utils::logging;
use serde_json::json;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "mqsim", version)]
enum Command {
    /// Run virtual sensors publishing to a monitor until Ctrl-C
    Demo {
        /// Number of sensor clients
        #[arg(long, default_value_t = 3)]
        sensors: usize,
        /// Delay between readings of one sensor
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
        /// Readings per sensor (0 means until interrupted)
        #[arg(long, default_value_t = 10)]
        readings: u64,
    },
    /// Publish a burst of messages and print the broker state
    Stats {
        #[arg(long, default_value_t = 5)]
        messages: u64,
        /// Print the snapshot as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&settings.logging.level);

    let result = match Command::parse() {
        Command::Demo {
            sensors,
            interval_ms,
            readings,
        } => run_demo(&settings, sensors, Duration::from_millis(interval_ms), readings).await,
        Command::Stats { messages, json } => run_stats(&settings, messages, json),
    };

    if let Err(e) = result {
        error!("mqsim failed: {}", e);
        std::process::exit(1);
    }
}

async fn run_demo(
    settings: &Settings,
    sensors: usize,
    interval: Duration,
    readings: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = BrokerRegistry::new();
    let broker = registry.attach(&settings.broker)?;
    info!(backend = mqsim::backend_name(), version = mqsim::version(), "starting demo");

    let mut control = Client::create(broker.clone(), "control")?;
    control.connect(&ConnectOptions::default())?;
    control.publish_string("config/armed", "true", QoS::AtLeastOnce, true)?;

    let mut monitor = Client::create(broker.clone(), "monitor")?.with_settings(&settings.client);
    monitor.connect(&ConnectOptions::default())?;
    monitor.subscribe("config/#", QoS::AtLeastOnce, |msg: &Message| {
        println!(
            "[config] {} = {}",
            msg.topic,
            msg.payload_str().unwrap_or("<binary>")
        );
    })?;
    monitor.subscribe("sensors/+/temperature", QoS::AtMostOnce, print_reading)?;
    monitor.subscribe("sensors/#", QoS::AtMostOnce, print_reading)?;

    let stop = monitor.stop_handle();
    let monitor_task = tokio::spawn(async move {
        if let Err(e) = monitor.loop_forever().await {
            error!("monitor loop failed: {}", e);
        }
        monitor
    });

    let qos = settings.client.qos()?;
    let mut sensor_tasks = Vec::with_capacity(sensors);
    for index in 0..sensors {
        let broker = broker.clone();
        sensor_tasks.push(tokio::spawn(async move {
            if let Err(e) = run_sensor(broker, index, qos, interval, readings).await {
                warn!(sensor = index, "sensor stopped: {}", e);
            }
        }));
    }

    tokio::select! {
        _ = async {
            for task in sensor_tasks {
                let _ = task.await;
            }
        } => {
            info!("all sensors finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    stop.stop();
    let monitor = monitor_task.await?;
    monitor.print_stats()?;
    monitor.destroy();
    control.destroy();

    // Sensors still running after Ctrl-C keep the broker busy.
    if let Err(e) = registry.cleanup(broker.name()) {
        warn!("broker left attached: {}", e);
    }
    Ok(())
}

fn print_reading(msg: &Message) {
    println!(
        "[seq {}] {} -> {}",
        msg.sequence,
        msg.topic,
        msg.payload_str().unwrap_or("<binary>")
    );
}

async fn run_sensor(
    broker: Arc<Broker>,
    index: usize,
    qos: QoS,
    interval: Duration,
    readings: u64,
) -> mqsim::Result<()> {
    let id = format!("sensor_{index}");
    let mut client = Client::create(broker, &id)?;
    client.connect(&ConnectOptions::default())?;

    let mut count = 0;
    while readings == 0 || count < readings {
        let temperature = 20.0 + (index as f64) + (count % 10) as f64 * 0.1;
        let reading = json!({
            "sensor": id,
            "temperature": temperature,
            "timestamp_ms": mqsim::utils::timestamp_ms(),
        });
        client.publish_string(
            &format!("sensors/{id}/temperature"),
            &reading.to_string(),
            qos,
            false,
        )?;
        client.publish_string(
            &format!("sensors/{id}/humidity"),
            &format!("{}", 40 + (count % 5)),
            qos,
            false,
        )?;
        count += 1;
        tokio::time::sleep(interval).await;
    }

    client.disconnect()
}

fn run_stats(
    settings: &Settings,
    messages: u64,
    as_json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let broker = Arc::new(Broker::new(settings.broker.clone())?);
    let mut client = Client::create(broker.clone(), "")?;
    client.connect(&ConnectOptions::default())?;
    client.subscribe("stats/#", QoS::AtMostOnce, |_| {})?;

    for i in 0..messages {
        client.publish_string(&format!("stats/{i}"), &i.to_string(), QoS::AtMostOnce, i == 0)?;
    }

    let stats = broker.stats()?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{stats}");
    }
    client.destroy();
    Ok(())
}
