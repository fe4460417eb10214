use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serial_test::serial;

use rentscan::protocol::{Command, RentalMessage};
use rentscan::recovery::RecoveryLevel;
use rentscan::supervisor::{MessageHandler, Supervisor, with_central};
use rentscan::test_support::manual_central;
use rentscan::{Error, Handle, Result, ms};

use crate::common::{self, connected_central, fixtures};

#[derive(Default, Clone)]
struct Recorder {
    seen: Arc<Mutex<Vec<Command>>>,
    fail: bool,
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle(&self, msg: RentalMessage) -> Result<()> {
        self.seen.lock().unwrap().push(msg.cmd);
        if self.fail {
            Err(Error::Handler("backend unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
#[serial]
async fn pump_relays_notifications_to_handler() -> anyhow::Result<()> {
    let (central, mock, _clock, conn) = connected_central()?;
    let recorder = Recorder::default();
    let sup = Supervisor::new(central, recorder.clone());

    mock.lock()
        .notify(conn, Handle::new(0x15), &fixtures::rental_start_bytes());
    let report = sup.pump_once().await?;
    assert_eq!((report.received, report.handled, report.failed), (1, 1, 0));
    assert_eq!(*recorder.seen.lock().unwrap(), vec![Command::RentalStart]);
    Ok(())
}

#[tokio::test]
#[serial]
async fn handler_failures_reset_the_stack_at_threshold() -> anyhow::Result<()> {
    let (central, mock, _clock, conn) = connected_central()?;
    let sup = Supervisor::new(
        central,
        Recorder {
            fail: true,
            ..Recorder::default()
        },
    );

    for _ in 0..5 {
        mock.lock()
            .notify(conn, Handle::new(0x15), &fixtures::rental_start_bytes());
    }
    let report = sup.pump_once().await?;
    assert_eq!(report.failed, 5);
    assert_eq!(report.recovery, Some(RecoveryLevel::FullStackReset));

    let status = with_central(&sup.central(), |c| Ok(c.status())).await?;
    assert_eq!(status.message_errors, 0);
    assert!(status.scanning);
    Ok(())
}

#[tokio::test]
#[serial]
async fn spawned_supervisor_starts_scanning_and_stops() -> anyhow::Result<()> {
    common::init_logging();
    let (central, mock, _clock) = manual_central()?;
    let handle = Supervisor::new(central, Recorder::default())
        .with_pump_interval(ms(5))
        .with_health_period(ms(10))
        .spawn();

    tokio::time::sleep(ms(50)).await;
    assert!(mock.lock().scanning);

    // The advert is picked up by the pump and discovery runs to completion.
    mock.lock()
        .advertise(fixtures::fixture_peer(), fixtures::target_adv(), true);
    tokio::time::sleep(ms(50)).await;
    let connected = with_central(&handle.central(), |c| Ok(c.is_connected())).await?;
    assert!(connected);

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
#[serial]
async fn poisoned_lock_is_reported() -> anyhow::Result<()> {
    let (central, _mock, _clock) = manual_central()?;
    let sup = Supervisor::new(central, Recorder::default());
    let shared = sup.central();
    let _ = std::thread::spawn(move || {
        let _guard = shared.lock().unwrap();
        panic!("poison the central");
    })
    .join();
    assert!(matches!(
        sup.health_check().await,
        Err(Error::StatePoisoned)
    ));
    Ok(())
}
