//! Boots one virtual device and attaches an interactive shell to it.
//!
//! ```text
//! cargo run --example boot_device -- --config router.toml
//! ```

use std::io::{BufRead, Write};
use std::time::Duration;

use clap::Parser;

use devsim_core::{Device, DeviceConfig};

#[derive(Parser)]
#[command(about = "Boot a simulated Linux/network device and drop into its shell")]
struct Args {
    /// TOML device configuration; defaults to a single-router setup.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match args.config {
        Some(path) => {
            let text = std::fs::read_to_string(&path).expect("read config file");
            DeviceConfig::from_toml_str(&text).expect("parse config file")
        }
        None => DeviceConfig::default(),
    };

    let mut device = Device::boot(config).expect("device boot");
    println!("{} ready, type commands (ctrl-d to quit)", device.hostname());

    // Drive the OSPF timer wheel while the shell is interactive.
    let engine = device.ospf();
    tokio::spawn(async move {
        while engine.is_running() {
            engine.tick();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("root@{}:~# ", device.hostname());
        stdout.flush().expect("flush prompt");

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        print!("{}", device.execute(line.trim_end_matches('\n')));
    }

    device.shutdown();
}
