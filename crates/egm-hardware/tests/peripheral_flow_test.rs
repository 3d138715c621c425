//! End-to-end peripheral flows over the mock transport.
//!
//! 1. Coin jam: one fault edge, reset keeps it, clearing restores `Idle`.
//! 2. Escrow guard: a held note times out after the guard without host
//!    polling and can still be returned.
//! 3. Full stacker: accept is refused, return goes through.

mod common;

use common::{drain, is_fault_occurred, next_event};
use egm_hardware::config::EscrowConfig;
use egm_hardware::{EscrowOutcome, EscrowState, EventKind, HardwareError, LinkState};
use egm_protocol::reports::{
    CoinFault, CoinFaultStatus, CoinInStatus, DeviceReset, EscrowExtend, NoteAccept, NoteFault,
    NoteReturn, NoteState, NoteStatus, StackerStatus,
};
use std::time::Duration;

fn note_status(state: NoteState) -> NoteStatus {
    NoteStatus {
        state,
        ticket: false,
        note_id: 3,
    }
}

fn is_escrow_change_to(to: EscrowState) -> impl FnMut(&EventKind) -> bool {
    move |kind| matches!(kind, EventKind::EscrowChanged { to: t, .. } if *t == to)
}

// ============================================================================
// Coin acceptor
// ============================================================================

#[tokio::test]
async fn test_coin_jam_single_edge_and_recovery() {
    let mut rig = common::coin_acceptor().await;
    let jam = CoinFaultStatus {
        fault: CoinFault::Jam,
    };

    rig.handle.push_report(&jam).await.unwrap();
    let (event, _) = next_event(&mut rig.events, is_fault_occurred).await;
    assert_eq!(&event.device, rig.device.control().identity());
    assert_eq!(
        event.kind,
        EventKind::FaultOccurred {
            fault: "Jam",
            active: 0b1
        }
    );
    assert_eq!(rig.device.state(), LinkState::Faulted);

    // Repeated jam reports are not new edges
    rig.handle.push_report(&jam).await.unwrap();
    rig.handle.push_report(&jam).await.unwrap();
    rig.handle
        .push_report(&CoinInStatus {
            channel: 1,
            legal: true,
            to_hopper: false,
            value_cents: 25,
        })
        .await
        .unwrap();
    let (_, skipped) = next_event(&mut rig.events, |k| matches!(k, EventKind::CoinIn { .. })).await;
    assert!(!skipped.iter().any(is_fault_occurred));

    // Reset does not clear faults
    rig.device.reset().await.unwrap();
    assert_eq!(rig.handle.written_reports::<DeviceReset>().len(), 1);
    assert_eq!(rig.device.state(), LinkState::Resetting);
    rig.handle.push_report(&jam).await.unwrap();
    next_event(&mut rig.events, |k| {
        matches!(k, EventKind::ConnectionChanged { to: LinkState::Faulted, .. })
    })
    .await;
    assert!(rig.device.faults().contains(CoinFault::Jam));

    let cleared = rig.device.clear_faults();
    assert_eq!(cleared.len(), 1);
    assert_eq!(rig.device.state(), LinkState::Idle);
    assert!(matches!(
        drain(&mut rig.events).as_slice(),
        [
            EventKind::FaultsCleared { previous: 0b1 },
            EventKind::ConnectionChanged {
                from: LinkState::Faulted,
                to: LinkState::Idle
            }
        ]
    ));

    // The same fault is a new edge after clearing
    rig.handle.push_report(&jam).await.unwrap();
    next_event(&mut rig.events, is_fault_occurred).await;
}

#[tokio::test]
async fn test_commands_refused_after_close() {
    let rig = common::coin_acceptor().await;
    rig.device.close().await.unwrap();

    let result = rig.device.set_reject(true).await;
    assert!(matches!(result, Err(HardwareError::InvalidState { .. })));
    assert!(rig.handle.written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stalled_write_disconnects() {
    let mut rig = common::coin_acceptor().await;
    rig.handle.set_stall_writes(true);

    let result = rig.device.set_reject(true).await;
    assert!(matches!(result, Err(HardwareError::Timeout { .. })));
    assert_eq!(rig.device.state(), LinkState::Disconnected);

    let kinds = drain(&mut rig.events);
    assert_eq!(
        kinds.last(),
        Some(&EventKind::ConnectionChanged {
            from: LinkState::Busy,
            to: LinkState::Disconnected
        })
    );
}

// ============================================================================
// Hopper
// ============================================================================

#[tokio::test]
async fn test_hopper_payout_reports() {
    use egm_protocol::reports::{CoinOutStatus, HopperMotor};

    let mut rig = common::hopper().await;
    rig.device.set_max_payout(2).await.unwrap();
    rig.device.start_motor().await.unwrap();
    assert_eq!(
        rig.handle.written_reports::<HopperMotor>(),
        vec![HopperMotor { run: true }]
    );

    for _ in 0..2 {
        rig.handle
            .push_report(&CoinOutStatus {
                legal: true,
                count: 1,
            })
            .await
            .unwrap();
        next_event(&mut rig.events, |k| matches!(k, EventKind::CoinOut { .. })).await;
    }
}

// ============================================================================
// Note acceptor
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_escrow_times_out_after_guard() {
    let mut rig = common::note_acceptor(EscrowConfig::default()).await;

    rig.handle
        .push_report(&note_status(NoteState::InEscrow))
        .await
        .unwrap();
    next_event(&mut rig.events, is_escrow_change_to(EscrowState::InEscrow)).await;

    tokio::time::advance(Duration::from_millis(5000)).await;
    assert!(!rig.device.poll());
    assert_eq!(rig.device.escrow_state(), EscrowState::InEscrow);

    tokio::time::advance(Duration::from_millis(1)).await;
    next_event(&mut rig.events, is_escrow_change_to(EscrowState::TimedOut)).await;
    assert_eq!(rig.device.escrow_state(), EscrowState::TimedOut);
    assert_eq!(rig.device.last_outcome(), Some(EscrowOutcome::TimedOut));

    // The held note can still be returned
    assert!(rig.device.return_note().await.unwrap());
    assert_eq!(rig.handle.written_reports::<NoteReturn>().len(), 1);
    rig.handle
        .push_report(&note_status(NoteState::Returned))
        .await
        .unwrap();
    next_event(&mut rig.events, is_escrow_change_to(EscrowState::Empty)).await;
    assert_eq!(rig.device.last_outcome(), Some(EscrowOutcome::Returned));
}

#[tokio::test(start_paused = true)]
async fn test_status_traffic_expires_guard() {
    let mut rig = common::note_acceptor(EscrowConfig::default()).await;

    rig.handle
        .push_report(&note_status(NoteState::InEscrow))
        .await
        .unwrap();
    next_event(&mut rig.events, is_escrow_change_to(EscrowState::InEscrow)).await;

    tokio::time::advance(Duration::from_millis(5001)).await;
    for _ in 0..3 {
        rig.handle
            .push_report(&note_status(NoteState::InEscrow))
            .await
            .unwrap();
    }
    next_event(&mut rig.events, is_escrow_change_to(EscrowState::TimedOut)).await;
    assert_eq!(rig.device.last_outcome(), Some(EscrowOutcome::TimedOut));
}

#[tokio::test]
async fn test_failed_return_retried_after_reconnect() {
    let mut rig = common::note_acceptor(EscrowConfig::default()).await;

    rig.handle
        .push_report(&note_status(NoteState::InEscrow))
        .await
        .unwrap();
    next_event(&mut rig.events, is_escrow_change_to(EscrowState::InEscrow)).await;

    rig.handle.set_fail_writes(true);
    assert!(rig.device.return_note().await.is_err());
    assert_eq!(rig.device.escrow_state(), EscrowState::InEscrow);
    assert_eq!(rig.device.state(), LinkState::Disconnected);

    rig.handle.set_fail_writes(false);
    let mut device = rig.handle.clone();
    let (state, _) = tokio::join!(rig.device.open(), async move {
        device.wait_for_writes(2).await;
        device.push_report(&StackerStatus::default()).await.unwrap();
    });
    assert_eq!(state.unwrap(), LinkState::Idle);

    assert!(rig.device.return_note().await.unwrap());
    assert_eq!(rig.handle.written_reports::<NoteReturn>().len(), 1);
    rig.handle
        .push_report(&note_status(NoteState::Returned))
        .await
        .unwrap();
    next_event(&mut rig.events, is_escrow_change_to(EscrowState::Empty)).await;
    assert_eq!(rig.device.last_outcome(), Some(EscrowOutcome::Returned));
}

#[tokio::test(start_paused = true)]
async fn test_extend_restarts_guard() {
    let mut rig = common::note_acceptor(EscrowConfig { timeout_ms: 1000 }).await;

    rig.handle
        .push_report(&note_status(NoteState::InEscrow))
        .await
        .unwrap();
    next_event(&mut rig.events, is_escrow_change_to(EscrowState::InEscrow)).await;

    tokio::time::advance(Duration::from_millis(800)).await;
    assert!(rig.device.extend_timeout().await.unwrap());
    assert_eq!(rig.handle.written_reports::<EscrowExtend>().len(), 1);

    tokio::time::advance(Duration::from_millis(800)).await;
    assert!(!rig.device.poll());

    tokio::time::advance(Duration::from_millis(201)).await;
    next_event(&mut rig.events, is_escrow_change_to(EscrowState::TimedOut)).await;
}

#[tokio::test]
async fn test_timed_out_note_cleared_by_device() {
    let mut rig = common::note_acceptor(EscrowConfig { timeout_ms: 1 }).await;

    rig.handle
        .push_report(&note_status(NoteState::InEscrow))
        .await
        .unwrap();
    next_event(&mut rig.events, is_escrow_change_to(EscrowState::InEscrow)).await;

    next_event(&mut rig.events, is_escrow_change_to(EscrowState::TimedOut)).await;

    // The device returned the note by itself
    rig.handle
        .push_report(&note_status(NoteState::Returned))
        .await
        .unwrap();
    next_event(&mut rig.events, is_escrow_change_to(EscrowState::Empty)).await;
    assert!(rig.device.escrow().session().is_none());
}

#[tokio::test]
async fn test_full_stacker_blocks_accept_not_return() {
    let mut rig = common::note_acceptor(EscrowConfig::default()).await;

    rig.handle
        .push_report(&StackerStatus {
            full: true,
            ..Default::default()
        })
        .await
        .unwrap();
    next_event(&mut rig.events, |k| {
        matches!(k, EventKind::StackerStatusChanged(_))
    })
    .await;
    assert!(rig.device.faults().contains(NoteFault::StackerFull));
    assert_eq!(rig.device.state(), LinkState::Faulted);

    rig.handle
        .push_report(&note_status(NoteState::InEscrow))
        .await
        .unwrap();
    next_event(&mut rig.events, is_escrow_change_to(EscrowState::InEscrow)).await;

    assert!(!rig.device.accept().await.unwrap());
    assert!(!rig.device.extend_timeout().await.unwrap());
    assert_eq!(rig.device.escrow_state(), EscrowState::InEscrow);
    assert!(rig.handle.written_reports::<NoteAccept>().is_empty());

    assert!(rig.device.return_note().await.unwrap());
    assert_eq!(rig.handle.written_reports::<NoteReturn>().len(), 1);
    assert_eq!(rig.device.escrow_state(), EscrowState::Returning);
}

#[tokio::test]
async fn test_door_open_does_not_block_accept() {
    let mut rig = common::note_acceptor(EscrowConfig::default()).await;

    rig.handle
        .push_report(&StackerStatus {
            door_open: true,
            ..Default::default()
        })
        .await
        .unwrap();
    rig.handle
        .push_report(&note_status(NoteState::InEscrow))
        .await
        .unwrap();
    next_event(&mut rig.events, is_escrow_change_to(EscrowState::InEscrow)).await;

    assert!(rig.device.faults().contains(NoteFault::DoorOpen));
    assert!(rig.device.accept().await.unwrap());
    assert_eq!(rig.handle.written_reports::<NoteAccept>().len(), 1);
}

#[tokio::test]
async fn test_unchanged_stacker_status_suppressed() {
    let mut rig = common::note_acceptor(EscrowConfig::default()).await;
    let jam = StackerStatus {
        jam: true,
        ..Default::default()
    };

    for _ in 0..3 {
        rig.handle.push_report(&jam).await.unwrap();
    }
    rig.handle
        .push_report(&note_status(NoteState::InEscrow))
        .await
        .unwrap();
    let (_, skipped) =
        next_event(&mut rig.events, is_escrow_change_to(EscrowState::InEscrow)).await;

    let stacker_changes = skipped
        .iter()
        .filter(|k| matches!(k, EventKind::StackerStatusChanged(_)))
        .count();
    assert_eq!(stacker_changes, 1);
    assert_eq!(skipped.iter().filter(|k| is_fault_occurred(k)).count(), 1);
}
