//! End-to-end session through the facade against the simulated board.

use fl593::{Alarm, DeviceState, FeedbackMode, Fl593Builder};
use fl593_test_harness::SimTransport;

#[tokio::test(start_paused = true)]
async fn full_session_through_the_facade() {
    let device = Fl593Builder::new()
        .build_with_transport(Box::new(SimTransport::seeded(11)))
        .await
        .unwrap();
    assert_eq!(device.state(), DeviceState::Ready);

    // Identity comes back from the cache on the second call, same value.
    let model = device.status().model().await.unwrap();
    assert_eq!(model, "FL593FL");
    assert_eq!(device.status().model().await.unwrap(), model);

    // Bring-up left everything dark.
    assert_eq!(device.status().output_enabled(), Some(false));
    assert_eq!(device.ld1().setpoint_ma().await.unwrap(), 0.0);

    // Program a channel and light it up.
    device.ld1().set_limit_ma(120.0).await.unwrap();
    device.ld1().set_setpoint_ma(60.0).await.unwrap();
    device.status().set_remote_enable(true).await.unwrap();

    let snapshot = device.update().await.unwrap();
    assert_eq!(snapshot.ld1.mode, FeedbackMode::ConstantCurrent);
    assert!(snapshot.ld1.current_monitor_ma > 55.0);
    assert!(snapshot.ld1.current_monitor_ma < 65.0);
    assert_eq!(device.status().alarm(Alarm::Ren), Some(true));

    // The device refuses currents above its ceiling.
    assert!(device.ld1().set_setpoint_ma(900.0).await.is_err());

    device.close().await;
    assert_eq!(device.state(), DeviceState::Unattached);
}
