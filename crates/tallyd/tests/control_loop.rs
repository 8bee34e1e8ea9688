//! Drive the control loop end to end over in-memory transport channels.
//!
//! Tokio time is paused, so registration pacing, flash pulses and the
//! reconnect interval all run instantly but in the right order.

use std::time::Duration;

use anyhow::Result;
use pretty_assertions::assert_eq;
use tallyconf::TimingConfig;
use tallyd::lamp::Level;
use tallyd::transport::TransportPeer;
use tallyd::{
    ControlInput, ControlLoop, LampSignal, Listener, LoopExit, MemoryLamps, TransportCommand,
    TransportHandle, TransportMessage,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

const BUS_OPTIONS: &str = r#"["bus_options",[{"id":"pv","type":"preview","label":"Preview"},{"id":"pg","type":"program","label":"Program"},{"id":"ax","type":"aux","label":"Aux 2"}]]"#;

struct Harness {
    peer: TransportPeer,
    controls: mpsc::Sender<ControlInput>,
    lamps: MemoryLamps,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<LoopExit>>,
}

impl Harness {
    fn start() -> Self {
        let (mut handle, peer) = TransportHandle::pair(64);
        let (controls, mut control_rx) = mpsc::channel(8);
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let lamps = MemoryLamps::new();

        let timing = TimingConfig::default();
        let listener = Listener::new(
            std::array::from_fn(|i| format!("Tally-Tally{}-TEST", i + 1)),
            Instant::now(),
            timing.reconnect_interval(),
        );
        let mut control_loop = ControlLoop::new(listener, lamps.clone(), timing, "tally.test:4455");

        let task = tokio::spawn(async move {
            control_loop
                .run(&mut handle, &mut control_rx, async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Self {
            peer,
            controls,
            lamps,
            shutdown: Some(shutdown),
            task,
        }
    }

    async fn command(&mut self) -> TransportCommand {
        self.peer.commands.recv().await.expect("control loop alive")
    }

    async fn send(&self, message: TransportMessage) {
        self.peer.messages.send(message).await.expect("control loop alive");
        // Let the loop drain what we just queued
        sleep(Duration::from_millis(1)).await;
    }

    async fn text(&self, text: &str) {
        self.send(TransportMessage::Text(text.to_string())).await;
    }

    /// Answer the pending connect and collect the registrations that follow.
    async fn connect(&mut self) -> Vec<String> {
        assert_eq!(self.command().await, TransportCommand::Connect);
        self.peer
            .messages
            .send(TransportMessage::Connected)
            .await
            .expect("control loop alive");

        let mut envelopes = Vec::new();
        for _ in 0..4 {
            match self.command().await {
                TransportCommand::Send(envelope) => envelopes.push(envelope),
                other => panic!("expected a registration, got {:?}", other),
            }
        }
        envelopes
    }

    async fn stop(mut self) -> LoopExit {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.expect("task joins").expect("loop succeeds")
    }
}

const PREVIEW: LampSignal = LampSignal {
    green: Level::Full,
    red: Level::Off,
};

const PROGRAM: LampSignal = LampSignal {
    green: Level::Off,
    red: Level::Full,
};

#[tokio::test(start_paused = true)]
async fn registers_four_endpoints_in_slot_order() {
    let mut h = Harness::start();

    assert_eq!(h.command().await, TransportCommand::Connect);
    h.peer.messages.send(TransportMessage::Connected).await.unwrap();

    let mut received = Vec::new();
    for _ in 0..4 {
        let TransportCommand::Send(envelope) = h.command().await else {
            panic!("expected registration");
        };
        received.push((Instant::now(), envelope));
    }

    for (i, (_, envelope)) in received.iter().enumerate() {
        let expected = format!(
            r#"["listenerclient_connect",{{"deviceId":"unassigned","listenerType":"Tally-Tally{}-TEST","canBeReassigned":true,"canBeFlashed":true,"supportsChat":false}}]"#,
            i + 1
        );
        assert_eq!(envelope, &expected);
    }
    for pair in received.windows(2) {
        assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(100));
    }

    // Exactly four, nothing trailing
    assert!(timeout(Duration::from_secs(1), h.peer.commands.recv())
        .await
        .is_err());

    assert_eq!(h.stop().await, LoopExit::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn disconnect_blacks_out_and_retries_on_interval() {
    let mut h = Harness::start();
    h.connect().await;

    h.text(BUS_OPTIONS).await;
    h.text(r#"["device_states",[{"busId":"pg","sources":["cam"]}]]"#).await;
    assert_eq!(h.lamps.current()[0], PROGRAM);

    let lost_at = Instant::now();
    h.send(TransportMessage::Disconnected).await;
    assert!(h.lamps.current().iter().all(|s| *s == LampSignal::DARK));

    // First retry one interval after the drop
    assert_eq!(h.command().await, TransportCommand::Connect);
    let waited = Instant::now() - lost_at;
    assert!(waited >= Duration::from_secs(5), "retried after {:?}", waited);
    assert!(waited < Duration::from_millis(5100), "retried after {:?}", waited);

    // Attempt fails; the next one follows a full interval later
    let failed_at = Instant::now();
    h.send(TransportMessage::Disconnected).await;
    assert_eq!(h.command().await, TransportCommand::Connect);
    assert!(Instant::now() - failed_at >= Duration::from_millis(4990));

    // Lamps stay dark until new state arrives
    let registrations = {
        h.peer.messages.send(TransportMessage::Connected).await.unwrap();
        let mut n = 0;
        for _ in 0..4 {
            if let TransportCommand::Send(_) = h.command().await {
                n += 1;
            }
        }
        n
    };
    assert_eq!(registrations, 4);
    assert!(h.lamps.current().iter().all(|s| *s == LampSignal::DARK));

    assert_eq!(h.stop().await, LoopExit::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn flash_restores_resolved_states() {
    let mut h = Harness::start();
    h.connect().await;

    h.text(BUS_OPTIONS).await;
    h.text(r#"["device_states",[{"busId":"pv","sources":["cam"]},{"busId":"ax","sources":["gfx"]}]]"#)
        .await;
    let before = h.lamps.current();
    assert_eq!(before[0], PREVIEW);
    assert_eq!(before[2], PROGRAM);

    // Junk in between changes nothing
    h.text("not an envelope").await;
    h.text(r#"["device_states",{oops]"#).await;
    assert_eq!(h.lamps.current(), before);

    h.text(r#"["flash"]"#).await;
    sleep(Duration::from_secs(2)).await;

    assert_eq!(h.lamps.full_frames(), 3);
    assert_eq!(h.lamps.current(), before);

    assert_eq!(h.stop().await, LoopExit::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn assigned_ids_are_used_on_reregistration() {
    let mut h = Harness::start();
    let first = h.connect().await;
    assert!(first.iter().all(|e| e.contains(r#""deviceId":"unassigned""#)));

    h.text(r#"["deviceId","cam-1"]"#).await;
    h.text(r#"["deviceId","cam-2"]"#).await;
    h.send(TransportMessage::Disconnected).await;

    let again = h.connect().await;
    assert!(again[0].contains(r#""deviceId":"cam-1""#));
    assert!(again[1].contains(r#""deviceId":"cam-2""#));
    assert!(again[2].contains(r#""deviceId":"unassigned""#));
    assert!(again[3].contains(r#""listenerType":"Tally-Tally4-TEST""#));

    assert_eq!(h.stop().await, LoopExit::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn long_press_requests_settings_reset() {
    let mut h = Harness::start();
    h.connect().await;
    h.text(BUS_OPTIONS).await;
    h.text(r#"["device_states",[{"busId":"pg","sources":["cam"]}]]"#).await;

    // A short press only reports
    h.controls.send(ControlInput::ShortPress).await.unwrap();
    sleep(Duration::from_millis(1)).await;
    assert!(!h.task.is_finished());

    h.controls.send(ControlInput::LongPress).await.unwrap();
    let exit = (&mut h.task).await.expect("task joins").expect("loop succeeds");
    assert_eq!(exit, LoopExit::SettingsReset);
    assert!(h.lamps.current().iter().all(|s| *s == LampSignal::DARK));
}

#[tokio::test(start_paused = true)]
async fn bus_options_change_re_resolves_lamps() {
    let mut h = Harness::start();
    h.connect().await;

    h.text(BUS_OPTIONS).await;
    h.text(r#"["device_states",[{"busId":"pg","sources":["cam"]}]]"#).await;
    assert_eq!(h.lamps.current()[0], PROGRAM);

    // Operator retypes the bus; no new device_states follows
    h.text(r#"["bus_options",[{"id":"pg","type":"preview","label":"Preview"}]]"#)
        .await;
    assert_eq!(h.lamps.current()[0], PREVIEW);

    assert_eq!(h.stop().await, LoopExit::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn flash_after_reconnect_stays_dark() {
    let mut h = Harness::start();
    h.connect().await;

    h.text(BUS_OPTIONS).await;
    h.text(r#"["device_states",[{"busId":"pg","sources":["cam"]}]]"#).await;
    assert_eq!(h.lamps.current()[0], PROGRAM);

    h.send(TransportMessage::Disconnected).await;
    h.connect().await;
    sleep(Duration::from_millis(1)).await;

    // Server flashes before it sends any fresh state
    h.text(r#"["flash"]"#).await;
    sleep(Duration::from_secs(2)).await;

    assert_eq!(h.lamps.full_frames(), 3);
    assert!(h.lamps.current().iter().all(|s| *s == LampSignal::DARK));

    assert_eq!(h.stop().await, LoopExit::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn stalled_transport_never_blocks_long_press() {
    let mut h = Harness::start();
    assert_eq!(h.command().await, TransportCommand::Connect);
    h.send(TransportMessage::Disconnected).await;

    // Transport stops reading; reconnect ticks pile up past the queue depth
    sleep(Duration::from_secs(5 * 70)).await;
    assert!(!h.task.is_finished());

    h.controls.send(ControlInput::LongPress).await.unwrap();
    let exit = timeout(Duration::from_secs(1), &mut h.task)
        .await
        .expect("long press handled")
        .expect("task joins")
        .expect("loop succeeds");
    assert_eq!(exit, LoopExit::SettingsReset);

    let mut queued = 0;
    while let Ok(cmd) = h.peer.commands.try_recv() {
        assert_eq!(cmd, TransportCommand::Connect);
        queued += 1;
    }
    assert_eq!(queued, 64);
}
