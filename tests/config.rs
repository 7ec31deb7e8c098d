#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::Value as JsonValue;
    use silo::{Bean, Engine, EngineConfig, JsonCodec, Result, SerdeJsonCodec};
    use silo_tests::{MemoryExecutor, init_logs};
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use time::macros::offset;

    #[test]
    fn engine_from_url() {
        init_logs();
        let engine = Engine::from_url(
            "silo://?tz_location=%2B05:30&cache_size=10&cache_expiry_ms=250&unknown=1",
        )
        .expect("Failed to read the url");
        assert_eq!(engine.config().tz_location, offset!(+5:30));
        assert_eq!(engine.context().tz_location, offset!(+5:30));
        assert_eq!(engine.config().cache_expiry, Some(Duration::from_millis(250)));
        assert!(engine.get_cacher("anything").is_some());

        let engine = Engine::from_url("silo://?cache_size=10&disable_global_cache=1")
            .expect("Failed to read the url");
        assert!(engine.get_cacher("anything").is_none());
        assert!(Engine::from_url("silo://?tz_database=mars").is_err());
        assert!(Engine::default().get_cacher("anything").is_none());
        assert_eq!(*Engine::default().config(), EngineConfig::default());
    }

    #[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
    struct Settings {
        theme: String,
        size: u32,
    }

    #[derive(Bean, Default, Clone, Debug, PartialEq)]
    #[silo(table = "profiles")]
    struct Profile {
        #[silo(pk)]
        id: i64,
        #[silo(json)]
        settings: Settings,
    }

    #[derive(Default)]
    struct CountingCodec {
        encoded: AtomicUsize,
        decoded: AtomicUsize,
    }

    impl JsonCodec for CountingCodec {
        fn encode(&self, value: &JsonValue) -> Result<Vec<u8>> {
            self.encoded.fetch_add(1, Ordering::Relaxed);
            SerdeJsonCodec.encode(value)
        }
        fn decode(&self, data: &[u8]) -> Result<JsonValue> {
            self.decoded.fetch_add(1, Ordering::Relaxed);
            SerdeJsonCodec.decode(data)
        }
    }

    #[tokio::test]
    async fn json_codec_is_replaceable() {
        init_logs();
        let mut executor = MemoryExecutor::new();
        executor.create_table::<Profile>();
        let codec = Arc::new(CountingCodec::default());
        let engine = Engine::default().with_json_codec(codec.clone());
        let mut profile = Profile {
            id: 7,
            settings: Settings {
                theme: "dark".into(),
                size: 14,
            },
        };
        engine
            .session(&mut executor)
            .insert(&mut profile)
            .await
            .expect("Failed to insert the profile");
        let loaded = engine
            .session(&mut executor)
            .get::<Profile>()
            .await
            .expect("Failed to load the profile")
            .expect("The profile exists");
        assert_eq!(loaded, profile);
        assert_eq!(codec.encoded.load(Ordering::Relaxed), 1);
        assert_eq!(codec.decoded.load(Ordering::Relaxed), 1);
    }
}
