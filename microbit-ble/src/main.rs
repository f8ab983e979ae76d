//! Console client for the BBC micro:bit
//!
//! `scan` lists nearby devices. `run` opens an interactive page: each input
//! line fills a field and/or clicks a button, and every field change or alert
//! is printed as it happens.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use microbit_app::{Controller, ControllerConfig, Page, UiEvent, controller_home, ids};
use microbit_gatt::Bluetooth;
use microbit_gatt::ble::{self, BtleplugBluetooth};
use microbit_gatt::mock::{MockBluetooth, MockPeripheral};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "microbit-ble")]
#[command(about = "Talk to a BBC micro:bit over Bluetooth Low Energy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for nearby devices
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Open the interactive console
    Run {
        /// Device name prefix to look for
        #[arg(short, long)]
        prefix: Option<String>,
        /// How long to scan before connecting, in seconds
        #[arg(long)]
        scan_secs: Option<u64>,
        /// Per-column scrolling delay for LED text, in milliseconds
        #[arg(long)]
        scrolling_delay: Option<u16>,
        /// Use an in-memory micro:bit instead of the Bluetooth adapter
        #[arg(long)]
        mock: bool,
    },
}

const HELP: &str = "\
commands:
  connect | disconnect
  show <text>          scroll text on the display
  send <text>          send a UART request
  matrix <r1>/../<r5>  write a pattern, e.g. matrix .#.#./#####/#####/.###./..#..
  clear | refresh      clear or read back the LED matrix
  delay                read the scrolling delay
  test | cancel        start or cancel the guided self-test
  fields               print every field
  quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let home = controller_home();
    let mut config = ControllerConfig::load_or_create(&home)?;

    match cli.command {
        Commands::Scan { duration } => {
            scan_devices(&config.name_prefix, duration).await?;
        }
        Commands::Run { prefix, scan_secs, scrolling_delay, mock } => {
            if let Some(prefix) = prefix {
                config.name_prefix = prefix;
            }
            if let Some(secs) = scan_secs {
                config.scan_secs = secs;
            }
            if let Some(delay) = scrolling_delay {
                config.scrolling_delay_ms = delay;
            }

            let bluetooth: Arc<dyn Bluetooth> = if mock {
                Arc::new(MockBluetooth::with_device(MockPeripheral::microbit()))
            } else {
                Arc::new(BtleplugBluetooth::new(config.scan_duration()))
            };
            run_console(bluetooth, config).await?;
        }
    }

    Ok(())
}

async fn scan_devices(prefix: &str, duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    println!("Scanning for micro:bit devices ({duration} seconds)...");

    let devices = ble::scan(prefix, Duration::from_secs(duration)).await?;

    println!("\nFound {} devices:", devices.len());
    for device in devices {
        let rssi = device.rssi.map(|r| format!("{r} dBm")).unwrap_or_else(|| "N/A".to_string());
        let marker = if device.is_microbit { " [MICRO:BIT]" } else { "" };
        println!("  {} ({}) RSSI: {}{}", device.name, device.address, rssi, marker);
    }
    Ok(())
}

async fn run_console(
    bluetooth: Arc<dyn Bluetooth>,
    config: ControllerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let page = Arc::new(Page::standard());
    let printer = tokio::spawn(print_events(page.subscribe()));

    let controller = Arc::new(Controller::new(bluetooth, config, page.clone()));
    let actions = controller.bind();
    let dispatcher = tokio::spawn(controller.clone().run(actions));

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let (command, arg) = match line.trim().split_once(' ') {
            Some((command, arg)) => (command, arg.trim()),
            None => (line.trim(), ""),
        };
        match command {
            "" => {}
            "connect" => {
                page.click(ids::CONNECT);
            }
            "disconnect" => {
                page.click(ids::DISCONNECT);
            }
            "show" => {
                page.set_text(ids::MESSAGE, arg);
                page.click(ids::SHOW);
            }
            "send" => {
                page.set_text(ids::REQUEST, arg);
                page.click(ids::SEND);
            }
            "matrix" => {
                page.set_text(ids::LED_MATRIX, arg);
                page.click(ids::WRITE_MATRIX);
            }
            "clear" => {
                page.click(ids::CLEAR_MATRIX);
            }
            "refresh" => {
                page.click(ids::REFRESH_MATRIX);
            }
            "delay" => {
                if let Ok(Some(delay)) = controller.read_scrolling_delay().await {
                    println!("scrolling delay: {delay} ms");
                }
            }
            "test" => {
                page.click(ids::TEST_START);
            }
            "cancel" => {
                page.click(ids::TEST_CANCEL);
            }
            "fields" => {
                for id in ids::FIELDS {
                    print_field(id, &page.text(id));
                }
            }
            "help" => println!("{HELP}"),
            "quit" | "exit" => break,
            other => println!("unknown command {other:?}, try help"),
        }
    }

    dispatcher.abort();
    controller.shutdown().await;
    // let the last status change print
    tokio::task::yield_now().await;
    printer.abort();
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<UiEvent>) {
    loop {
        match events.recv().await {
            Ok(UiEvent::Field { id, text }) => print_field(&id, &text),
            Ok(UiEvent::Alert(message)) => println!("! {message}"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("dropped {n} page events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_field(id: &str, text: &str) {
    if text.contains('\n') {
        println!("{id}:");
        for row in text.lines() {
            println!("  {row}");
        }
    } else {
        println!("{id}: {text}");
    }
}
