//! # Registry File Scenarios
//!
//! A deployment loads one shared registry file in every process; these
//! tests drive the bus from a file on disk instead of in-code descriptors.

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use state_bus::{
        BusError, ChannelRegistry, ConfigError, LiveLocation, MessageType, Publisher, Settings,
        SubscriberHub,
    };
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const REGISTRY: &str = r#"
[[channels]]
name = "nav"
address = "127.0.0.1:9110"
type = "Settings"
rate_hz = 5

[[channels]]
name = "location"
address = "127.0.0.1:9111"
type = "LiveLocation"
rate_hz = 20
"#;

    fn registry_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_file_registry_drives_every_channel() {
        let file = registry_file(REGISTRY);
        let registry = ChannelRegistry::load(file.path()).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["location", "nav"]);

        let nav = registry.get("nav").unwrap();
        assert_eq!(nav.message_type, MessageType::Settings);
        assert_eq!(nav.timeout(10.0), Duration::from_secs(2));
        let location = registry.get("location").unwrap();
        assert_eq!(location.timeout(10.0), Duration::from_millis(500));

        let context = tcp_context();
        let hub = SubscriberHub::open_all(&registry).unwrap();
        assert!(hub.is_subscribed("nav") && hub.is_subscribed("location"));

        let mut nav_publisher = Publisher::open_with("nav", &registry, &context).unwrap();
        let mut location_publisher =
            Publisher::open_with("location", &registry, &context).unwrap();

        let settings = Settings {
            search_input: 3,
            upcoming_turn: "left".to_string(),
            ..Default::default()
        };
        assert!(attach(&mut nav_publisher, &hub, "nav", settings));
        assert!(attach(
            &mut location_publisher,
            &hub,
            "location",
            LiveLocation {
                timestamp: 11,
                ..Default::default()
            }
        ));

        assert!(hub.alive().values().all(|alive| *alive));
    }

    #[test]
    fn test_unregistered_name_fails_closed() {
        let file = registry_file(REGISTRY);
        let registry = ChannelRegistry::load(file.path()).unwrap();

        assert!(matches!(
            Publisher::open_with("radar", &registry, &tcp_context()),
            Err(BusError::UnknownChannel(_))
        ));
        assert!(matches!(
            SubscriberHub::open_with(["nav", "radar"], &registry, &tcp_context()),
            Err(BusError::UnknownChannel(_))
        ));
    }

    #[test]
    fn test_bad_registry_file_rejected() {
        let file = registry_file(
            r#"
[[channels]]
name = "nav"
address = "127.0.0.1:9112"
type = "Weather"
"#,
        );
        assert!(matches!(
            ChannelRegistry::load(file.path()),
            Err(ConfigError::UnknownType { .. })
        ));
    }
}
