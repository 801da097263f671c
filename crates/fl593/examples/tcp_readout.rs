//! Connect to a board over a TCP serial bridge and poll its monitors.
//!
//! Run with:
//!
//! ```sh
//! cargo run -p fl593 --example tcp_readout -- 192.168.1.50:5000
//! ```

use std::time::Duration;

use fl593::Fl593Builder;

#[tokio::main]
async fn main() -> fl593::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5000".to_string());

    let device = Fl593Builder::new().build_tcp(&addr).await?;

    println!("model:  {}", device.status().model().await?);
    println!("serial: {}", device.status().serial().await?);

    for _ in 0..10 {
        let snapshot = device.update().await?;
        println!(
            "LD1 IMON={:.3} mA  LD2 IMON={:.3} mA  output={:?}",
            snapshot.ld1.current_monitor_ma,
            snapshot.ld2.current_monitor_ma,
            device.status().output_enabled(),
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    device.close().await;
    Ok(())
}
