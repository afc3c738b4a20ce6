//! # Delivery Scenarios
//!
//! End-to-end behaviour over loopback TCP:
//!
//! 1. **Delivery**: a published value is readable from another hub promptly,
//!    including payloads above the per-subscriber backlog limit
//! 2. **Staleness**: a silent channel stops reporting data after `K / rate_hz`
//! 3. **Isolation**: a publish storm on one channel leaves others untouched
//! 4. **Shutdown**: close is idempotent and frees the address
//! 5. **Recovery**: a hub follows a publisher that restarts

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use state_bus::{BusError, LiveLocation, Measurement, Publisher, Settings, SubscriberHub};
    use std::thread;
    use std::time::{Duration, Instant};

    fn settings(search_input: i64) -> Settings {
        Settings {
            search_input,
            ..Default::default()
        }
    }

    fn location(timestamp: u64) -> LiveLocation {
        LiveLocation {
            timestamp,
            position_geodetic: Measurement {
                value: vec![52.1, 4.3],
                std: vec![0.5, 0.5],
                valid: true,
            },
            ..Default::default()
        }
    }

    // =========================================================================
    // DELIVERY
    // =========================================================================

    #[test]
    fn test_nav_settings_readable_within_50ms() {
        let registry = registry([settings_channel("nav", 9001, 5.0)]);
        let context = tcp_context();
        let mut publisher = Publisher::open_with("nav", &registry, &context).unwrap();
        let hub = SubscriberHub::open_with(["nav"], &registry, &context).unwrap();
        assert!(attach(&mut publisher, &hub, "nav", settings(-1)));

        let sent_at = Instant::now();
        publisher.publish(settings(42)).unwrap();

        let mut received = None;
        let delivered = wait_until(Duration::from_millis(50), || {
            received = hub
                .read("nav")
                .unwrap()
                .and_then(|view| view.as_settings().map(|s| s.search_input))
                .filter(|value| *value == 42);
            received.is_some()
        });

        assert!(delivered, "not delivered after {:?}", sent_at.elapsed());
        assert_eq!(received, Some(42));
        assert!(hub.is_alive("nav").unwrap());
    }

    #[test]
    fn test_large_settings_delivered() {
        let registry = registry([settings_channel("nav", 9113, 5.0)]);
        let context = tcp_context();
        let mut publisher = Publisher::open_with("nav", &registry, &context).unwrap();
        let hub = SubscriberHub::open_with(["nav"], &registry, &context).unwrap();
        assert!(attach(&mut publisher, &hub, "nav", settings(-1)));

        // Larger than the default 1 MiB per-subscriber backlog.
        let large = Settings {
            search_input: 11,
            banner_instructions: "x".repeat(2 * 1024 * 1024),
            ..Default::default()
        };
        assert!(attach(&mut publisher, &hub, "nav", large.clone()));

        let view = hub.read("nav").unwrap().unwrap();
        assert_eq!(view.as_settings().unwrap(), &large);
    }

    // =========================================================================
    // STALENESS
    // =========================================================================

    #[test]
    fn test_silent_channel_goes_stale() {
        // 5 Hz with K = 10: stale after 2 s of silence.
        let registry = registry([settings_channel("nav", 9102, 5.0)]);
        let context = tcp_context();
        let mut publisher = Publisher::open_with("nav", &registry, &context).unwrap();
        let hub = SubscriberHub::open_with(["nav"], &registry, &context).unwrap();
        assert!(attach(&mut publisher, &hub, "nav", settings(7)));

        thread::sleep(Duration::from_secs(1));
        assert!(hub.is_alive("nav").unwrap());
        assert!(hub.read("nav").unwrap().is_some());

        thread::sleep(Duration::from_millis(1500));
        assert!(!hub.is_alive("nav").unwrap());
        assert!(hub.read("nav").unwrap().is_none());
        assert!(hub.read("nav").unwrap().is_none());
        assert!(hub.last_received("nav").unwrap().unwrap() >= Duration::from_millis(2500));
        assert_eq!(hub.alive().get("nav"), Some(&false));

        // Publishing again revives the channel.
        assert!(attach(&mut publisher, &hub, "nav", settings(8)));
        assert!(hub.is_alive("nav").unwrap());
    }

    // =========================================================================
    // ISOLATION
    // =========================================================================

    #[test]
    fn test_publish_storm_leaves_other_channel_untouched() {
        let registry = registry([
            settings_channel("nav", 9103, 100.0),
            location_channel("pose", 9104, 10.0),
        ]);
        let context = tcp_context();
        let mut nav = Publisher::open_with("nav", &registry, &context).unwrap();
        let mut pose = Publisher::open_with("pose", &registry, &context).unwrap();
        let hub = SubscriberHub::open_with(["nav", "pose"], &registry, &context).unwrap();
        assert!(attach(&mut nav, &hub, "nav", settings(0)));
        assert!(attach(&mut pose, &hub, "pose", location(0)));

        let storm = thread::spawn(move || {
            for i in 1..=5_000 {
                nav.publish(settings(i)).unwrap();
            }
            nav
        });

        for timestamp in 1..=20u64 {
            pose.publish(location(timestamp)).unwrap();
            let seen = wait_until(SETTLE_LIMIT, || {
                hub.read("pose")
                    .unwrap()
                    .and_then(|view| view.as_live_location().map(|l| l.timestamp))
                    == Some(timestamp)
            });
            assert!(seen, "pose update {timestamp} lost during storm");
            thread::sleep(Duration::from_millis(5));
        }

        let mut nav = storm.join().unwrap();
        assert!(nav.messages_published() > 5_000);

        // Frames may be dropped under backpressure, but the channel settles
        // on whatever is published last.
        assert!(attach(&mut nav, &hub, "nav", settings(-99)));
        let view = hub.read("nav").unwrap().unwrap();
        assert_eq!(view.as_settings().unwrap().search_input, -99);
        assert!(hub.messages_received("nav").unwrap() >= 2);

        let view = hub.read("pose").unwrap().unwrap();
        assert_eq!(view.as_live_location().unwrap(), &location(20));
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    #[test]
    fn test_close_twice_is_harmless() {
        let registry = registry([settings_channel("nav", 9105, 20.0)]);
        let context = tcp_context();
        let mut publisher = Publisher::open_with("nav", &registry, &context).unwrap();
        let mut hub = SubscriberHub::open_with(["nav"], &registry, &context).unwrap();
        assert!(attach(&mut publisher, &hub, "nav", settings(1)));

        let started = Instant::now();
        hub.close();
        hub.close();
        // Workers notice shutdown within one poll interval.
        assert!(started.elapsed() < context.config.join_timeout);
        assert!(hub.is_closed());
        assert_eq!(hub.running_workers(), 0);
        assert!(hub.read("nav").unwrap().is_none());
        assert!(!hub.is_alive("nav").unwrap());

        publisher.close();
        publisher.close();
        assert!(matches!(
            publisher.publish(settings(2)),
            Err(BusError::Closed(_))
        ));

        // The address can be bound again.
        let mut again = Publisher::open_with("nav", &registry, &context).unwrap();
        again.publish(settings(3)).unwrap();
    }

    // =========================================================================
    // RECOVERY
    // =========================================================================

    #[test]
    fn test_hub_follows_restarted_publisher() {
        let registry = registry([settings_channel("nav", 9106, 20.0)]);
        let context = tcp_context();
        let hub = SubscriberHub::open_with(["nav"], &registry, &context).unwrap();

        let mut first = Publisher::open_with("nav", &registry, &context).unwrap();
        assert!(attach(&mut first, &hub, "nav", settings(1)));
        drop(first);

        let mut second = Publisher::open_with("nav", &registry, &context).unwrap();
        assert!(attach(&mut second, &hub, "nav", settings(2)));
        assert!(hub.messages_received("nav").unwrap() >= 2);
    }

    #[test]
    fn test_hub_opened_before_publisher() {
        let registry = registry([settings_channel("nav", 9107, 20.0)]);
        let context = tcp_context();
        let hub = SubscriberHub::open_with(["nav"], &registry, &context).unwrap();
        assert!(hub.read("nav").unwrap().is_none());

        thread::sleep(Duration::from_millis(100));
        let mut publisher = Publisher::open_with("nav", &registry, &context).unwrap();
        assert!(attach(&mut publisher, &hub, "nav", settings(5)));
    }

    // =========================================================================
    // PACING
    // =========================================================================

    #[test]
    fn test_paced_publisher_keeps_channel_alive() {
        let registry = registry([settings_channel("nav", 9108, 20.0)]);
        let context = tcp_context();
        let mut publisher = Publisher::open_with("nav", &registry, &context).unwrap();
        let hub = SubscriberHub::open_with(["nav"], &registry, &context).unwrap();
        assert!(attach(&mut publisher, &hub, "nav", settings(0)));

        let mut keeper = publisher.rate_keeper();
        let started = Instant::now();
        for i in 1..=20 {
            publisher.publish(settings(i)).unwrap();
            keeper.tick();
            assert!(hub.is_alive("nav").unwrap());
        }

        // 20 ticks at 50 ms.
        assert!(started.elapsed() >= Duration::from_millis(950));
        assert!(!keeper.is_lagging());
    }

    #[test]
    fn test_publish_without_subscribers_never_blocks() {
        let registry = registry([settings_channel("nav", 9109, 20.0)]);
        let mut publisher = Publisher::open_with("nav", &registry, &tcp_context()).unwrap();

        let started = Instant::now();
        for i in 0..1_000 {
            publisher.publish(settings(i)).unwrap();
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(publisher.subscriber_count(), 0);
        assert_eq!(publisher.messages_published(), 1_000);
    }
}
