//! Drive a simulated board through a full session: bring-up, setpoint
//! programming, enable, a few monitor readouts, and safety shutdown.
//!
//! Run with:
//!
//! ```sh
//! cargo run -p fl593 --example sim_readout
//! ```

use std::time::Duration;

use fl593::{Alarm, Fl593Builder};
use fl593_test_harness::SimTransport;

#[tokio::main]
async fn main() -> fl593::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let device = Fl593Builder::new()
        .build_with_transport(Box::new(SimTransport::seeded(42)))
        .await?;

    println!("model:    {}", device.status().model().await?);
    println!("serial:   {}", device.status().serial().await?);
    println!("firmware: {}", device.status().firmware_version().await?);
    println!("channels: {}", device.status().channel_count().await?);

    device.ld1().set_limit_ma(100.0).await?;
    let setpoint = device.ld1().set_setpoint_ma(50.0).await?;
    println!("LD1 setpoint: {:.2} mA", setpoint);

    device.status().set_remote_enable(true).await?;
    device.status().update_alarms().await?;
    println!("output on: {:?}", device.status().alarm(Alarm::Out));

    for _ in 0..5 {
        let snapshot = device.update().await?;
        println!(
            "LD1 mode={} IMON={:.3} mA PMON={:.3} mA",
            snapshot.ld1.mode, snapshot.ld1.current_monitor_ma, snapshot.ld1.power_monitor_ma
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    device.close().await;
    Ok(())
}
