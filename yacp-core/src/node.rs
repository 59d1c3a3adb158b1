//! Bus-facing calibration node
//!
//! Glues a [`CanTransport`], an [`EepromStorage`] and the firmware's
//! [`LiveData`] to a [`SharedCal`]: frames in, replies out. Firmware calls [`CalNode::poll`] from its CAN
//! receive task or interrupt, or feeds frames through
//! [`CalNode::handle_frame`] when it already has them.

use embassy_sync::blocking_mutex::raw::RawMutex;
use yacp_hal::{CanTransport, EepromStorage, CAN_PAYLOAD_LEN};
use yacp_protocol::{Addressing, CanFrame, Response};

use crate::config::ProtocolConfig;
use crate::dispatch::Dispatcher;
use crate::error::CalError;
use crate::live::LiveData;
use crate::persist::LoadOutcome;
use crate::shared::SharedCal;

/// Upper bound on frames handled per [`CalNode::poll`] call
pub const MAX_FRAMES_PER_POLL: usize = 16;

/// Node errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeError<E> {
    /// Engine failure during startup
    Cal(CalError),
    /// Transport failure
    Transport(E),
}

impl<E> From<CalError> for NodeError<E> {
    fn from(e: CalError) -> Self {
        NodeError::Cal(e)
    }
}

/// One calibration endpoint on the bus
///
/// `live` is `()` for firmware that exposes no settings or measurement
/// block.
pub struct CalNode<'s, 'a, M: RawMutex, T, S, L, const N: usize> {
    cal: &'s SharedCal<'a, M, N>,
    transport: T,
    storage: S,
    live: L,
    dispatcher: Dispatcher,
}

impl<'s, 'a, M, T, S, L, const N: usize> CalNode<'s, 'a, M, T, S, L, N>
where
    M: RawMutex,
    T: CanTransport,
    S: EepromStorage,
    L: LiveData,
{
    pub fn new(
        cal: &'s SharedCal<'a, M, N>,
        transport: T,
        storage: S,
        live: L,
        config: ProtocolConfig,
    ) -> Self {
        if !config.codes.is_unambiguous() {
            warn!("Calibration command codes overlap");
        }
        if let Addressing::Device(id) = config.addressing {
            if id > Addressing::MAX_DEVICE_ID || !config.codes.fits_nibble() {
                warn!("Device {} cannot be addressed with these codes", id);
            }
        }
        Self {
            cal,
            transport,
            storage,
            live,
            dispatcher: Dispatcher::new(config),
        }
    }

    /// Bring up the transport and load the persisted overrides
    pub fn init(&mut self) -> Result<LoadOutcome, NodeError<T::Error>> {
        self.transport.init().map_err(NodeError::Transport)?;
        let outcome = self.cal.init(&mut self.storage)?;
        info!("Calibration node ready, {} parameter(s)", N);
        Ok(outcome)
    }

    /// Handle one received frame and send the reply, if any
    pub fn handle_frame(
        &mut self,
        id: u32,
        data: [u8; CAN_PAYLOAD_LEN],
    ) -> Result<Option<Response>, T::Error> {
        let frame = CanFrame::new(id, data);
        let Some(response) = self.cal.handle(
            &self.dispatcher,
            &mut self.storage,
            &mut self.live,
            &frame,
        ) else {
            return Ok(None);
        };

        let reply = self.dispatcher.reply_frame(&frame, &response);
        self.transport.send(reply.id, &reply.data)?;
        Ok(Some(response))
    }

    /// Drain pending frames from the transport
    ///
    /// Handles at most [`MAX_FRAMES_PER_POLL`] frames. Returns how many
    /// were taken off the bus, including ones not addressed to the engine.
    pub fn poll(&mut self) -> Result<usize, T::Error> {
        let mut handled = 0;
        while handled < MAX_FRAMES_PER_POLL {
            let Some((id, data)) = self.transport.poll() else {
                break;
            };
            handled += 1;
            self.handle_frame(id, data)?;
        }
        Ok(handled)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn live(&self) -> &L {
        &self.live
    }

    pub fn live_mut(&mut self) -> &mut L {
        &mut self.live
    }

    /// Give back the transport, storage and live data
    pub fn release(self) -> (T, S, L) {
        (self.transport, self.storage, self.live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CalType;
    use crate::config::{DeviceIdentity, PersistConfig};
    use crate::live::LiveBlocks;
    use crate::schema::Schema;
    use crate::state::CalState;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use std::collections::VecDeque;
    use std::vec::Vec;
    use yacp_hal::RamEeprom;
    use yacp_protocol::{Command, CommandCodes, YACP_COMMAND_ID, YACP_RESPONSE_ID};

    static SCHEMA: Schema<2> = Schema::packed(1, [CalType::U8, CalType::U32]);

    #[derive(Default)]
    struct MockBus {
        rx: VecDeque<(u32, [u8; 8])>,
        tx: Vec<(u32, [u8; 8])>,
        fail_send: bool,
        initialized: bool,
    }

    impl CanTransport for MockBus {
        type Error = ();

        fn init(&mut self) -> Result<(), ()> {
            self.initialized = true;
            Ok(())
        }

        fn send(&mut self, id: u32, data: &[u8; 8]) -> Result<(), ()> {
            if self.fail_send {
                return Err(());
            }
            self.tx.push((id, *data));
            Ok(())
        }

        fn poll(&mut self) -> Option<(u32, [u8; 8])> {
            self.rx.pop_front()
        }
    }

    fn request(cmd: Command) -> (u32, [u8; 8]) {
        (YACP_COMMAND_ID, cmd.encode(&CommandCodes::DEFAULT))
    }

    #[test]
    fn test_init_brings_up_transport() {
        let cal: SharedCal<CriticalSectionRawMutex, 2> =
            SharedCal::new(CalState::new(&SCHEMA, PersistConfig::DEFAULT));
        let mut node = CalNode::new(
            &cal,
            MockBus::default(),
            RamEeprom::<32>::new(),
            (),
            ProtocolConfig::DEFAULT,
        );
        let outcome = node.init().unwrap();
        assert!(matches!(outcome, LoadOutcome::SchemaMismatch { .. }));
        assert!(node.transport().initialized);
    }

    #[test]
    fn test_poll_replies_on_request_id() {
        let cal: SharedCal<CriticalSectionRawMutex, 2> =
            SharedCal::new(CalState::new(&SCHEMA, PersistConfig::DEFAULT));
        let mut node = CalNode::new(
            &cal,
            MockBus::default(),
            RamEeprom::<32>::new(),
            (),
            ProtocolConfig::DEFAULT,
        );
        node.init().unwrap();

        let bus = node.transport_mut();
        bus.rx.push_back((0x321, [0; 8]));
        bus.rx.push_back(request(Command::Write {
            index: 0,
            value: [9, 0, 0, 0],
            width: 1,
        }));
        bus.rx.push_back(request(Command::Read { index: 0 }));

        assert_eq!(node.poll(), Ok(3));
        let tx = &node.transport().tx;
        assert_eq!(tx.len(), 2);
        assert_eq!(tx[0].0, YACP_COMMAND_ID);
        assert_eq!(tx[1].1[..3], [CommandCodes::DEFAULT.read, 1, 9]);
        assert_eq!(cal.effective(0, 0u8), 9);
    }

    #[test]
    fn test_dedicated_response_id() {
        let cal: SharedCal<CriticalSectionRawMutex, 2> =
            SharedCal::new(CalState::new(&SCHEMA, PersistConfig::DEFAULT));
        let config = ProtocolConfig {
            response_id: Some(YACP_RESPONSE_ID),
            ..ProtocolConfig::DEFAULT
        };
        let mut node = CalNode::new(&cal, MockBus::default(), RamEeprom::<32>::new(), (), config);
        node.init().unwrap();

        let (id, data) = request(Command::QueryStatus);
        let response = node.handle_frame(id, data).unwrap();
        assert!(matches!(response, Some(Response::Status { .. })));
        assert_eq!(node.transport().tx[0].0, YACP_RESPONSE_ID);
    }

    #[test]
    fn test_poll_is_bounded() {
        let cal: SharedCal<CriticalSectionRawMutex, 2> =
            SharedCal::new(CalState::new(&SCHEMA, PersistConfig::DEFAULT));
        let mut node = CalNode::new(
            &cal,
            MockBus::default(),
            RamEeprom::<32>::new(),
            (),
            ProtocolConfig::DEFAULT,
        );
        for _ in 0..MAX_FRAMES_PER_POLL + 3 {
            node.transport_mut().rx.push_back((0x7FF, [0; 8]));
        }
        assert_eq!(node.poll(), Ok(MAX_FRAMES_PER_POLL));
        assert_eq!(node.poll(), Ok(3));
        assert_eq!(node.poll(), Ok(0));
    }

    #[test]
    fn test_send_failure_propagates() {
        let cal: SharedCal<CriticalSectionRawMutex, 2> =
            SharedCal::new(CalState::new(&SCHEMA, PersistConfig::DEFAULT));
        let mut node = CalNode::new(
            &cal,
            MockBus::default(),
            RamEeprom::<32>::new(),
            (),
            ProtocolConfig::DEFAULT,
        );
        node.init().unwrap();
        node.transport_mut().fail_send = true;

        let (id, data) = request(Command::EnableOverride { index: 1 });
        assert_eq!(node.handle_frame(id, data), Err(()));
        // The change itself was applied and persisted
        assert_eq!(cal.effective(1, 7u32), 0);
        let (_, storage, _) = node.release();
        assert!(storage.commit_count() >= 2);
    }

    #[test]
    fn test_addressed_node_answers_broadcast_and_own_id() {
        let cal: SharedCal<CriticalSectionRawMutex, 2> =
            SharedCal::new(CalState::new(&SCHEMA, PersistConfig::DEFAULT));
        let config = ProtocolConfig {
            response_id: Some(YACP_RESPONSE_ID),
            addressing: Addressing::Device(2),
            identity: DeviceIdentity {
                firmware_version: 3,
                product_id: 7,
            },
            ..ProtocolConfig::DEFAULT
        };
        let live = LiveBlocks::new([0u8; 4], 1234u16.to_ne_bytes());
        let mut node = CalNode::new(&cal, MockBus::default(), RamEeprom::<32>::new(), live, config);
        node.init().unwrap();

        let bus = node.transport_mut();
        // HELLO broadcast, then READ_MEASUREMENT for device 5 and for us
        bus.rx.push_back((YACP_COMMAND_ID, [0x07, 0, 0, 0, 0, 0, 0, 0]));
        bus.rx.push_back((YACP_COMMAND_ID, [0x55, 0, 0, 2, 0, 0, 0, 0]));
        bus.rx.push_back((YACP_COMMAND_ID, [0x25, 0, 0, 2, 0, 0, 0, 0]));

        assert_eq!(node.poll(), Ok(3));
        let tx = &node.transport().tx;
        assert_eq!(tx.len(), 2);
        assert_eq!(tx[0].0, YACP_RESPONSE_ID);
        assert_eq!(tx[0].1[0], 0x27);
        assert_eq!(tx[0].1[4..6], [3, 7]);
        assert_eq!(tx[1].1, [0x25, 0, 0, 2, 0xD2, 0x04, 0, 0]);
    }
}
