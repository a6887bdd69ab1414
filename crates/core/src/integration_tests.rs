//! Integration tests: exercise the full flow against a simulated trackpad.
//!
//! A mock host emulates the control endpoint (mode report) and records every
//! interrupt-pipe call; tests feed completions through the driver and check
//! what reaches the frame queue.

#[cfg(test)]
mod tests {
    use crate::config::DriverConfig;
    use crate::driver::mock::MockHost;
    use crate::driver::Wellspring;
    use crate::error::Error;
    use crate::frame::testing::{trackpad_frame, Finger};
    use crate::mode::InterfaceMode;
    use crate::profile::{self, Variant};
    use crate::transfer::mock::HostCall;
    use crate::transfer::{Channel, Completion, TransportError, ERROR_LIMIT};

    fn started(variant: Variant, config: DriverConfig) -> Wellspring<MockHost> {
        let dev = Wellspring::attach(MockHost::new(), variant, config).unwrap();
        dev.open().unwrap();
        dev.start().unwrap();
        dev
    }

    fn touch() -> Finger {
        Finger {
            x: 500,
            y: 1200,
            pressure: 60,
            width: 400,
            orientation: 0,
        }
    }

    fn complete(dev: &Wellspring<MockHost>, data: &[u8]) {
        dev.on_transfer_complete(
            dev.host().pipes.last_id(Channel::Trackpad),
            Completion::Transferred { len: data.len() },
            data,
        );
    }

    fn fail(dev: &Wellspring<MockHost>, e: TransportError) {
        let id = dev.host().pipes.last_id(Channel::Trackpad);
        dev.on_transfer_complete(id, Completion::Failed(e), &[]);
    }

    /// Every variant arms trackpad transfers with header + 448 bytes.
    #[test]
    fn armed_length_matches_profile_for_every_variant() {
        for variant in Variant::ALL {
            let p = profile::lookup(*variant).unwrap();
            let dev = started(*variant, DriverConfig::default());
            assert!(dev
                .host()
                .pipes
                .calls()
                .contains(&HostCall::Submit(Channel::Trackpad, p.header_len() + 448)));
        }
    }

    /// Full frame: decoded, delivered, counter reset, re-armed.
    #[test]
    fn full_frame_is_delivered() {
        let dev = started(Variant::Wellspring3, DriverConfig::default());
        let data = trackpad_frame(dev.profile(), true, &[touch(), touch()]);
        complete(&dev, &data);

        let frame = dev.read_frame().expect("frame delivered");
        assert_eq!(frame.channel, Channel::Trackpad);
        assert!(frame.button);
        assert_eq!(frame.touches.len(), 2);
        assert_eq!(frame.touches[1].slot, 1);
        assert_eq!(frame.touches[0].x, 500);
        assert_eq!(dev.host().pipes.submits(Channel::Trackpad), 2);
    }

    /// Oversize frame: truncated to the expected length and still delivered.
    #[test]
    fn oversize_frame_is_truncated_and_delivered() {
        let dev = started(Variant::Wellspring, DriverConfig::default());
        let mut data = trackpad_frame(dev.profile(), false, &[touch()]);
        data.extend_from_slice(&[0xFF; 64]);
        complete(&dev, &data);

        let frame = dev.read_frame().expect("truncated frame delivered");
        assert_eq!(frame.touches.len(), 1);
        assert_eq!(dev.error_count(Channel::Trackpad), 0);
    }

    /// Short frame: dropped, counted exactly once, nothing delivered.
    #[test]
    fn short_frame_is_dropped_and_counted() {
        let dev = started(Variant::Wellspring4a, DriverConfig::default());
        let data = trackpad_frame(dev.profile(), false, &[touch()]);
        complete(&dev, &data[..data.len() - 1]);

        assert!(dev.read_frame().is_none());
        assert_eq!(dev.error_count(Channel::Trackpad), 1);
        assert_eq!(dev.host().pipes.submits(Channel::Trackpad), 2);
    }

    /// Stall: cleared, counted, re-armed.
    #[test]
    fn stall_is_cleared_and_retried() {
        let dev = started(Variant::Wellspring5a, DriverConfig::default());
        dev.host().pipes.clear();
        fail(&dev, TransportError::Stalled);

        assert_eq!(
            dev.host().pipes.calls(),
            vec![
                HostCall::ClearStall(Channel::Trackpad),
                HostCall::Submit(Channel::Trackpad, 478)
            ]
        );
        assert_eq!(dev.error_count(Channel::Trackpad), 1);
    }

    /// Cancelled: no resubmission, no stall clear.
    #[test]
    fn cancelled_transfer_is_not_resubmitted() {
        let dev = started(Variant::Wellspring5a, DriverConfig::default());
        dev.host().pipes.clear();
        fail(&dev, TransportError::Cancelled);

        assert!(dev.host().pipes.calls().is_empty());
        assert!(!dev.context(Channel::Trackpad).running);
    }

    /// Reports for transfers armed before a restart do not touch the new run.
    #[test]
    fn late_completions_from_previous_run_are_ignored() {
        let dev = started(Variant::Wellspring3, DriverConfig::default());
        let old = dev.host().pipes.last_id(Channel::Trackpad);
        let data = trackpad_frame(dev.profile(), false, &[touch()]);

        dev.stop().unwrap();
        dev.start().unwrap();
        assert_eq!(dev.host().pipes.submits(Channel::Trackpad), 2);

        dev.on_transfer_complete(old, Completion::Failed(TransportError::Cancelled), &[]);
        dev.on_transfer_complete(old, Completion::Failed(TransportError::Stalled), &[]);
        dev.on_transfer_complete(old, Completion::Transferred { len: data.len() }, &data);
        assert!(dev.is_started());
        assert!(dev.context(Channel::Trackpad).running);
        assert_eq!(dev.error_count(Channel::Trackpad), 0);
        assert!(dev.read_frame().is_none());

        // The current transfer is still pending, so start does not resubmit
        dev.start().unwrap();
        assert_eq!(dev.host().pipes.submits(Channel::Trackpad), 2);

        complete(&dev, &data);
        assert!(dev.read_frame().is_some());
        assert_eq!(dev.host().pipes.submits(Channel::Trackpad), 3);
    }

    /// Five consecutive failures halt the channel until stop + start.
    #[test]
    fn error_limit_halts_until_restart() {
        let dev = started(Variant::Wellspring6, DriverConfig::default());
        let good = trackpad_frame(dev.profile(), false, &[touch()]);

        for i in 0..ERROR_LIMIT {
            if i % 2 == 0 {
                complete(&dev, &good[..10]);
            } else {
                fail(&dev, TransportError::Fault);
            }
        }
        assert_eq!(dev.error_count(Channel::Trackpad), ERROR_LIMIT);
        let submits = dev.host().pipes.submits(Channel::Trackpad);
        // One initial arm plus one per recoverable error
        assert_eq!(submits, ERROR_LIMIT as usize);

        // No further arming, even if a stray completion shows up
        complete(&dev, &good);
        assert_eq!(dev.host().pipes.submits(Channel::Trackpad), submits);

        // A restart on an already started device does not reset the counter
        dev.start().unwrap();
        assert_eq!(dev.error_count(Channel::Trackpad), ERROR_LIMIT);

        dev.drain_frames();
        dev.stop().unwrap();
        dev.start().unwrap();
        assert_eq!(dev.error_count(Channel::Trackpad), 0);
        assert_eq!(dev.host().pipes.submits(Channel::Trackpad), submits + 1);

        complete(&dev, &good);
        assert!(dev.read_frame().is_some());
    }

    /// A good frame after any number of errors resets the counter.
    #[test]
    fn good_frame_resets_error_counter() {
        let dev = started(Variant::Wellspring2, DriverConfig::default());
        fail(&dev, TransportError::Stalled);
        fail(&dev, TransportError::Fault);
        complete(&dev, &[0u8; 12]);
        assert_eq!(dev.error_count(Channel::Trackpad), 3);

        let good = trackpad_frame(dev.profile(), false, &[]);
        complete(&dev, &good);
        assert_eq!(dev.error_count(Channel::Trackpad), 0);
    }

    /// The button channel follows the same bounded-retry policy.
    #[test]
    fn button_channel_shares_retry_policy() {
        let dev = started(Variant::Wellspring, DriverConfig::default());
        assert_eq!(dev.host().pipes.submits(Channel::Button), 1);

        let button = dev.host().pipes.last_id(Channel::Button);
        dev.on_transfer_complete(button, Completion::Transferred { len: 4 }, &[0, 1, 0, 0]);
        let frame = dev.read_frame().unwrap();
        assert_eq!(frame.channel, Channel::Button);
        assert!(frame.button);

        for _ in 0..ERROR_LIMIT {
            let button = dev.host().pipes.last_id(Channel::Button);
            dev.on_transfer_complete(button, Completion::Failed(TransportError::Stalled), &[]);
        }
        assert_eq!(dev.error_count(Channel::Button), ERROR_LIMIT);
        assert!(dev.context(Channel::Button).is_halted());
        // Trackpad channel is unaffected
        assert_eq!(dev.error_count(Channel::Trackpad), 0);
    }

    /// Full queue: the channel idles and a later start re-arms it.
    #[test]
    fn backpressure_idles_channel_until_restart() {
        let config = DriverConfig {
            queue_len: 1,
            ..DriverConfig::default()
        };
        let dev = started(Variant::Wellspring4, config);
        let good = trackpad_frame(dev.profile(), false, &[touch()]);

        complete(&dev, &good);
        assert_eq!(dev.host().pipes.submits(Channel::Trackpad), 1);

        // Still full: start does not arm
        dev.start().unwrap();
        assert_eq!(dev.host().pipes.submits(Channel::Trackpad), 1);

        assert!(dev.read_frame().is_some());
        dev.start().unwrap();
        assert_eq!(dev.host().pipes.submits(Channel::Trackpad), 2);
        // Pending transfer: a second start does not double-submit
        dev.start().unwrap();
        assert_eq!(dev.host().pipes.submits(Channel::Trackpad), 2);
    }

    /// open / close lifecycle.
    #[test]
    fn open_close_cycle() {
        let dev = Wellspring::attach(MockHost::new(), Variant::Wellspring3, DriverConfig::default())
            .unwrap();
        dev.open().unwrap();
        assert!(matches!(dev.open(), Err(Error::Busy(_))));
        dev.start().unwrap();
        assert!(dev.is_started());

        dev.close();
        assert!(!dev.is_open());
        assert!(!dev.is_started());
        assert_eq!(dev.host().control.report()[0], 0x08);
        assert!(dev.read_frame().is_none());

        dev.open().unwrap();
        dev.start().unwrap();
        assert_eq!(dev.mode_state().mode, Some(InterfaceMode::RawSensor));
    }

    /// Mode get/set through the driver.
    #[test]
    fn mode_round_trip_through_driver() {
        let dev = Wellspring::attach(MockHost::new(), Variant::Wellspring3, DriverConfig::default())
            .unwrap();
        dev.set_mode(0x08).unwrap();
        assert_eq!(dev.query_mode().unwrap()[0], 0x08);
        dev.set_mode(0x01).unwrap();
        assert_eq!(dev.query_mode().unwrap()[0], 0x01);

        dev.host().control.clear_requests();
        assert!(matches!(dev.set_mode(0x03), Err(Error::InvalidMode(0x03))));
        assert!(dev.host().control.requests().is_empty());
    }

    /// Stop with a failing control pipe still halts the channels.
    #[test]
    fn stop_halts_even_if_mode_switch_fails() {
        let dev = started(Variant::Wellspring6a, DriverConfig::default());
        dev.host().control.fail_set(true);
        assert!(dev.stop().is_err());
        assert!(!dev.is_started());
        assert!(!dev.context(Channel::Trackpad).running);
        assert!(dev
            .host()
            .pipes
            .calls()
            .contains(&HostCall::Stop(Channel::Trackpad)));
    }
}
