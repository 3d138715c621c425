//! Note and ticket acceptor with escrow.
//!
//! The device holds an inserted note in escrow until the host accepts or
//! returns it. Escrow progress follows `NoteStatus` reports:
//!
//! | Note state           | Escrow state | Effect          |
//! |----------------------|--------------|-----------------|
//! | `InEscrow`           | `Empty`      | session starts  |
//! | `Stacked`            | in progress  | accepted        |
//! | `Returned`/`Rejected`| in progress  | returned        |
//! | `Idle`               | in progress  | command outcome |
//! | any clear state      | `TimedOut`   | session dropped |
//!
//! A device may pass through `Stacked` between two polls, so any clear note
//! path finishes an accept or return in progress.
//!
//! Every note and stacker status also checks the escrow guard, and
//! [`NoteAcceptor::spawn_inbound`] runs the guard timer alongside the
//! inbound task, so a held note times out without host polling.
//!
//! A stacker status with a disabling flag blocks accept and extend; return
//! is always permitted. Every set stacker flag is also recorded as a
//! [`NoteFault`].

use super::on_self_test_result;
use crate::config::{DeviceConfig, EscrowConfig};
use crate::control::DeviceControl;
use crate::error::Result;
use crate::escrow::{EscrowController, EscrowOutcome, EscrowState};
use crate::events::{EventBus, EventKind};
use crate::state::LinkState;
use crate::status::StatusCache;
use crate::transport::Transport;
use egm_core::FaultSet;
use egm_protocol::reports::{
    DeviceReset, EscrowExtend, NoteAccept, NoteFault, NoteInhibit, NoteReturn, NoteState,
    NoteStatus, NoteTableEntry, NoteTableRequest, StackerStatus, StatusRequest,
    note_acceptor_reports,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type NoteTable = Arc<RwLock<BTreeMap<u8, NoteTableEntry>>>;

/// Note/ticket acceptor.
#[derive(Debug)]
pub struct NoteAcceptor<T: Transport> {
    control: Arc<DeviceControl<T, NoteFault>>,
    escrow: Arc<EscrowController>,
    notes: Arc<StatusCache<NoteStatus>>,
    table: NoteTable,
}

impl<T: Transport> NoteAcceptor<T> {
    pub fn new(
        config: DeviceConfig,
        escrow: &EscrowConfig,
        transport: T,
        events: EventBus,
    ) -> Self {
        let control =
            DeviceControl::new(config, transport, note_acceptor_reports(), events.clone());
        let identity = control.identity().clone();
        let escrow = Arc::new(EscrowController::new(
            identity.clone(),
            escrow.guard(),
            events.clone(),
        ));
        let notes = Arc::new(StatusCache::new());
        let table = NoteTable::default();

        control.on::<NoteStatus, _>({
            let identity = identity.clone();
            let escrow = Arc::clone(&escrow);
            let notes = Arc::clone(&notes);
            let events = events.clone();
            move |status| {
                escrow.check_timeout();
                if !notes.update(*status) {
                    return;
                }
                debug!(
                    device = %identity,
                    state = ?status.state,
                    note_id = status.note_id,
                    "Note status changed"
                );
                events.publish(&identity, EventKind::NoteStatusChanged(*status));
                follow_note_state(&escrow, status.state);
            }
        });

        control.on::<StackerStatus, _>({
            let identity = identity.clone();
            let control = Arc::downgrade(&control);
            let escrow = Arc::clone(&escrow);
            let events = events.clone();
            move |status| {
                escrow.check_timeout();
                if !escrow.update_stacker_status(*status) {
                    return;
                }
                debug!(device = %identity, ?status, "Stacker status changed");
                events.publish(&identity, EventKind::StackerStatusChanged(*status));
                if let Some(control) = control.upgrade() {
                    for fault in status.faults() {
                        control.raise_fault(fault);
                    }
                }
            }
        });

        control.on::<NoteTableEntry, _>({
            let table = Arc::clone(&table);
            move |entry| {
                let mut table = table.write();
                table.insert(entry.note_id, *entry);
                if entry.last {
                    info!(device = %identity, notes = table.len(), "Note table received");
                }
            }
        });

        on_self_test_result(&control, &events);

        Self {
            control,
            escrow,
            notes,
            table,
        }
    }

    /// Connect, handshaking with `StatusRequest`.
    ///
    /// # Errors
    ///
    /// See [`DeviceControl::open`].
    pub async fn open(&self) -> Result<LinkState> {
        self.control.open(&StatusRequest).await
    }

    /// # Errors
    ///
    /// See [`DeviceControl::close`].
    pub async fn close(&self) -> Result<()> {
        self.control.close().await
    }

    /// Stack the note in escrow.
    ///
    /// Returns `Ok(false)` without writing if nothing is in escrow or a
    /// disabling fault is active. If the command cannot be written the note
    /// stays in escrow.
    ///
    /// # Errors
    ///
    /// See [`DeviceControl::send_command`].
    pub async fn accept(&self) -> Result<bool> {
        if !self.escrow.begin_accept() {
            return Ok(false);
        }
        if let Err(e) = self.control.send_command(&NoteAccept).await {
            self.escrow.abort();
            return Err(e);
        }
        Ok(true)
    }

    /// Return the note in escrow, or the one held after a timeout.
    ///
    /// Permitted under any fault. Returns `Ok(false)` if nothing is held.
    /// If the command cannot be written the note stays held and the return
    /// can be retried.
    ///
    /// # Errors
    ///
    /// See [`DeviceControl::send_command`].
    pub async fn return_note(&self) -> Result<bool> {
        if !self.escrow.begin_return() {
            return Ok(false);
        }
        if let Err(e) = self.control.send_command(&NoteReturn).await {
            self.escrow.abort();
            return Err(e);
        }
        Ok(true)
    }

    /// Restart the escrow guard on both sides.
    ///
    /// Returns `Ok(false)` without writing if nothing is in escrow or a
    /// disabling fault is active.
    ///
    /// # Errors
    ///
    /// See [`DeviceControl::send_command`].
    pub async fn extend_timeout(&self) -> Result<bool> {
        if !self.escrow.extend_timeout() {
            return Ok(false);
        }
        self.control.send_command(&EscrowExtend).await?;
        Ok(true)
    }

    /// Ask the device for its note table. Rows arrive as `NoteTableEntry`
    /// reports.
    ///
    /// # Errors
    ///
    /// See [`DeviceControl::send_command`].
    pub async fn request_note_table(&self) -> Result<()> {
        self.control.send_command(&NoteTableRequest).await
    }

    /// # Errors
    ///
    /// See [`DeviceControl::send_command`].
    pub async fn set_inhibit(&self, inhibit: bool) -> Result<()> {
        self.control.send_command(&NoteInhibit { inhibit }).await?;
        info!(device = %self.control.identity(), inhibit, "Note inhibit set");
        Ok(())
    }

    /// # Errors
    ///
    /// See [`DeviceControl::reset`].
    pub async fn reset(&self) -> Result<()> {
        self.control.reset(&DeviceReset).await
    }

    /// # Errors
    ///
    /// See [`DeviceControl::self_test`].
    pub async fn self_test(&self, nvm: bool) -> Result<()> {
        self.control.self_test(nvm).await
    }

    /// Check the escrow guard now. Returns `true` if the session just timed
    /// out.
    pub fn poll(&self) -> bool {
        self.escrow.check_timeout()
    }

    pub fn note(&self, note_id: u8) -> Option<NoteTableEntry> {
        self.table.read().get(&note_id).copied()
    }

    /// Known notes ordered by id.
    pub fn note_table(&self) -> Vec<NoteTableEntry> {
        self.table.read().values().copied().collect()
    }

    pub fn escrow_state(&self) -> EscrowState {
        self.escrow.state()
    }

    pub fn last_outcome(&self) -> Option<EscrowOutcome> {
        self.escrow.last_outcome()
    }

    pub fn escrow(&self) -> &EscrowController {
        &self.escrow
    }

    pub fn note_status(&self) -> Option<NoteStatus> {
        self.notes.get()
    }

    pub fn stacker_status(&self) -> Option<StackerStatus> {
        self.escrow.stacker_status()
    }

    pub fn faults(&self) -> FaultSet<NoteFault> {
        self.control.faults()
    }

    pub fn clear_faults(&self) -> FaultSet<NoteFault> {
        self.control.clear_faults()
    }

    pub fn state(&self) -> LinkState {
        self.control.state()
    }

    pub fn control(&self) -> &Arc<DeviceControl<T, NoteFault>> {
        &self.control
    }

    /// Start the inbound consumer and the escrow guard timer. The timer
    /// stops when the inbound channel closes.
    pub fn spawn_inbound(&self) -> Option<JoinHandle<()>> {
        let inbound = self.control.spawn_inbound()?;
        let guard = self.escrow.spawn_guard();
        let identity = self.control.identity().clone();

        Some(tokio::spawn(async move {
            if let Err(e) = inbound.await {
                warn!(device = %identity, error = %e, "Inbound task ended abnormally");
            }
            guard.abort();
        }))
    }
}

fn follow_note_state(escrow: &EscrowController, state: NoteState) {
    match (state, escrow.state()) {
        (NoteState::InEscrow, EscrowState::Empty) => {
            escrow.note_detected();
        }
        (state, EscrowState::Accepting | EscrowState::Returning) if state.is_path_clear() => {
            escrow.complete_as(reported_outcome(state));
        }
        (state, EscrowState::TimedOut) if state.is_path_clear() => {
            escrow.path_cleared();
        }
        _ => {}
    }
}

/// Outcome named by a clear note state. `Idle` names none.
fn reported_outcome(state: NoteState) -> Option<EscrowOutcome> {
    match state {
        NoteState::Stacked => Some(EscrowOutcome::Accepted),
        NoteState::Returned | NoteState::Rejected => Some(EscrowOutcome::Returned),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockTransport, MockTransportHandle};
    use crate::peripherals::testing::answer_handshake;
    use egm_core::{DeviceIdentity, DeviceKind};
    use egm_protocol::encode;
    use std::time::Duration;

    async fn connected() -> (NoteAcceptor<MockTransport>, MockTransportHandle) {
        let (transport, handle) = MockTransport::new();
        let config = DeviceConfig::new(DeviceIdentity::new(DeviceKind::NoteAcceptor, 0x30, 1));
        let acceptor = NoteAcceptor::new(
            config,
            &EscrowConfig::default(),
            transport,
            EventBus::default(),
        );
        acceptor.spawn_inbound().unwrap();

        let (state, _) = tokio::join!(
            acceptor.open(),
            answer_handshake(handle.clone(), StackerStatus::default())
        );
        assert_eq!(state.unwrap(), LinkState::Idle);
        handle.clear_written();
        (acceptor, handle)
    }

    fn note(acceptor: &NoteAcceptor<MockTransport>, state: NoteState) {
        let status = NoteStatus {
            state,
            ticket: false,
            note_id: 2,
        };
        acceptor.control().on_frame(&encode(&status).unwrap());
    }

    #[tokio::test]
    async fn test_accept_cycle() {
        let (acceptor, handle) = connected().await;
        note(&acceptor, NoteState::InEscrow);
        assert_eq!(acceptor.escrow_state(), EscrowState::InEscrow);

        assert!(acceptor.accept().await.unwrap());
        assert_eq!(acceptor.escrow_state(), EscrowState::Accepting);
        assert_eq!(handle.written_reports::<NoteAccept>().len(), 1);

        note(&acceptor, NoteState::Stacking);
        note(&acceptor, NoteState::Stacked);
        assert_eq!(acceptor.escrow_state(), EscrowState::Empty);
        assert_eq!(acceptor.last_outcome(), Some(EscrowOutcome::Accepted));
    }

    #[tokio::test]
    async fn test_accept_without_note_is_noop() {
        let (acceptor, handle) = connected().await;
        assert!(!acceptor.accept().await.unwrap());
        assert!(!acceptor.return_note().await.unwrap());
        assert!(!acceptor.extend_timeout().await.unwrap());
        assert!(handle.written().is_empty());
    }

    #[tokio::test]
    async fn test_failed_accept_keeps_note() {
        let (acceptor, handle) = connected().await;
        note(&acceptor, NoteState::InEscrow);
        handle.set_fail_writes(true);

        assert!(acceptor.accept().await.is_err());
        assert_eq!(acceptor.escrow_state(), EscrowState::InEscrow);
    }

    #[tokio::test]
    async fn test_failed_return_can_be_retried() {
        let (acceptor, handle) = connected().await;
        note(&acceptor, NoteState::InEscrow);
        handle.set_fail_writes(true);

        assert!(acceptor.return_note().await.is_err());
        assert_eq!(acceptor.escrow_state(), EscrowState::InEscrow);
        assert_eq!(acceptor.state(), LinkState::Disconnected);

        handle.set_fail_writes(false);
        let mut device = handle.clone();
        let (state, _) = tokio::join!(acceptor.open(), async move {
            // The first handshake was write number one
            device.wait_for_writes(2).await;
            device.push_report(&StackerStatus::default()).await.unwrap();
        });
        assert_eq!(state.unwrap(), LinkState::Idle);
        handle.clear_written();

        assert!(acceptor.return_note().await.unwrap());
        assert_eq!(handle.written_reports::<NoteReturn>().len(), 1);
        assert_eq!(acceptor.escrow_state(), EscrowState::Returning);
    }

    #[tokio::test]
    async fn test_idle_report_finishes_accept() {
        let (acceptor, _handle) = connected().await;
        note(&acceptor, NoteState::InEscrow);
        acceptor.accept().await.unwrap();

        // Stacked fell between two polls
        note(&acceptor, NoteState::Idle);
        assert_eq!(acceptor.escrow_state(), EscrowState::Empty);
        assert_eq!(acceptor.last_outcome(), Some(EscrowOutcome::Accepted));

        note(&acceptor, NoteState::InEscrow);
        assert_eq!(acceptor.escrow_state(), EscrowState::InEscrow);
    }

    #[tokio::test]
    async fn test_idle_report_finishes_return() {
        let (acceptor, _handle) = connected().await;
        note(&acceptor, NoteState::InEscrow);
        acceptor.return_note().await.unwrap();

        note(&acceptor, NoteState::Idle);
        assert_eq!(acceptor.escrow_state(), EscrowState::Empty);
        assert_eq!(acceptor.last_outcome(), Some(EscrowOutcome::Returned));
    }

    #[tokio::test]
    async fn test_device_rejection_ends_accept_as_returned() {
        let (acceptor, _handle) = connected().await;
        note(&acceptor, NoteState::InEscrow);
        acceptor.accept().await.unwrap();

        note(&acceptor, NoteState::Rejected);
        assert_eq!(acceptor.escrow_state(), EscrowState::Empty);
        assert_eq!(acceptor.last_outcome(), Some(EscrowOutcome::Returned));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_traffic_expires_guard() {
        let (acceptor, _handle) = connected().await;
        note(&acceptor, NoteState::InEscrow);

        tokio::time::advance(Duration::from_millis(5001)).await;
        acceptor
            .control()
            .on_frame(&encode(&StackerStatus::default()).unwrap());
        assert_eq!(acceptor.escrow_state(), EscrowState::TimedOut);
        assert_eq!(acceptor.last_outcome(), Some(EscrowOutcome::TimedOut));
        // Already expired
        assert!(!acceptor.poll());
    }

    #[tokio::test]
    async fn test_return_cycle() {
        let (acceptor, handle) = connected().await;
        note(&acceptor, NoteState::InEscrow);

        assert!(acceptor.return_note().await.unwrap());
        assert_eq!(handle.written_reports::<NoteReturn>().len(), 1);

        note(&acceptor, NoteState::Returning);
        note(&acceptor, NoteState::Returned);
        assert_eq!(acceptor.escrow_state(), EscrowState::Empty);
        assert_eq!(acceptor.last_outcome(), Some(EscrowOutcome::Returned));
    }

    #[tokio::test]
    async fn test_repeated_status_suppressed() {
        let (acceptor, _handle) = connected().await;
        note(&acceptor, NoteState::InEscrow);
        let session = acceptor.escrow().session().unwrap();
        note(&acceptor, NoteState::InEscrow);
        assert_eq!(acceptor.escrow().session().unwrap().id, session.id);
        assert_eq!(acceptor.escrow().history().len(), 1);
    }

    #[tokio::test]
    async fn test_stacker_flags_raise_faults() {
        let (acceptor, _handle) = connected().await;
        let status = StackerStatus {
            jam: true,
            door_open: true,
            ..Default::default()
        };
        acceptor.control().on_frame(&encode(&status).unwrap());

        let faults = acceptor.faults();
        assert!(faults.contains(NoteFault::Jam));
        assert!(faults.contains(NoteFault::DoorOpen));
        assert_eq!(acceptor.state(), LinkState::Faulted);
        assert_eq!(acceptor.stacker_status(), Some(status));
    }

    #[tokio::test]
    async fn test_extend_writes_command() {
        let (acceptor, handle) = connected().await;
        note(&acceptor, NoteState::InEscrow);
        assert!(acceptor.extend_timeout().await.unwrap());
        assert_eq!(handle.written_reports::<EscrowExtend>().len(), 1);
    }

    #[tokio::test]
    async fn test_note_table() {
        let (acceptor, handle) = connected().await;
        acceptor.request_note_table().await.unwrap();
        assert_eq!(handle.written_reports::<NoteTableRequest>().len(), 1);

        for (note_id, value, last) in [(2u8, 2000u32, false), (1, 500, true)] {
            let entry = NoteTableEntry {
                note_id,
                currency: *b"EUR",
                value,
                last,
            };
            acceptor.control().on_frame(&encode(&entry).unwrap());
        }

        assert_eq!(acceptor.note(2).unwrap().value, 2000);
        assert_eq!(acceptor.note(9), None);
        let ids: Vec<_> = acceptor.note_table().iter().map(|e| e.note_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_inhibit() {
        let (acceptor, handle) = connected().await;
        acceptor.set_inhibit(true).await.unwrap();
        assert_eq!(
            handle.written_reports::<NoteInhibit>(),
            vec![NoteInhibit { inhibit: true }]
        );
    }
}
