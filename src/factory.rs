use glam::{Mat4, Vec3};

use crate::scene::{Collidable, Orientation, SceneObjectRecord};

/// Source of capture-time timestamps for asset identifiers.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock in UTC milliseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

/// Field-by-field overrides applied on top of the schema defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectOverrides {
    pub link: Option<String>,
    pub position: Option<Vec3>,
    pub orientation: Option<Orientation>,
    pub scale: Option<Vec3>,
    pub world_matrix: Option<Mat4>,
    pub collidable: Option<Collidable>,
    pub fixed: Option<bool>,
    pub mass: Option<f32>,
    pub scale_factor: Option<f32>,
}

impl ObjectOverrides {
    pub fn local_link(link: impl Into<String>) -> Self {
        Self {
            link: Some(link.into()),
            ..Self::default()
        }
    }

    fn apply(self, record: &mut SceneObjectRecord) {
        if let Some(link) = self.link {
            record.link = Some(link);
        }
        if let Some(position) = self.position {
            record.position = position;
        }
        if let Some(orientation) = self.orientation {
            record.orientation = orientation;
        }
        if let Some(scale) = self.scale {
            record.scale = scale;
        }
        if let Some(world_matrix) = self.world_matrix {
            record.world_matrix = world_matrix;
        }
        if let Some(collidable) = self.collidable {
            record.collidable = collidable;
        }
        if let Some(fixed) = self.fixed {
            record.fixed = fixed;
        }
        if let Some(mass) = self.mass {
            record.mass = mass;
        }
        if let Some(scale_factor) = self.scale_factor {
            record.scale_factor = scale_factor;
        }
    }
}

/// Builds scene-object records for freshly fetched or uploaded assets.
#[derive(Debug, Clone, Default)]
pub struct SceneObjectFactory<C = SystemClock> {
    clock: C,
}

impl SceneObjectFactory<SystemClock> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Clock> SceneObjectFactory<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    /// Record for `asset_link`, identified as `<seed>_<millis>`.
    ///
    /// Two calls with the same seed inside the same millisecond produce the
    /// same identifier.
    pub fn build_object(
        &self,
        asset_link: impl Into<String>,
        seed: &str,
        overrides: Option<ObjectOverrides>,
    ) -> SceneObjectRecord {
        let identifier = format!("{seed}_{}", self.clock.now_millis());
        let mut record = SceneObjectRecord::new(identifier, asset_link);
        if let Some(overrides) = overrides {
            overrides.apply(&mut record);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct SteppingClock(AtomicI64);

    impl Clock for SteppingClock {
        fn now_millis(&self) -> i64 {
            self.0.fetch_add(1, Ordering::Relaxed)
        }
    }

    #[test]
    fn defaults_follow_schema() {
        let factory = SceneObjectFactory::with_clock(FixedClock(1_700_000_000_000));
        let record = factory.build_object("https://host/files/abc/data", "abc", None);
        assert_eq!(record.asset_identifier, "abc_1700000000000");
        assert_eq!(record.asset_link, "https://host/files/abc/data");
        assert_eq!(record.position, Vec3::ZERO);
        assert_eq!(record.orientation.resolve(), Quat::IDENTITY);
        assert!(!record.orientation.is_unset());
        assert_eq!(record.scale, Vec3::ONE);
        assert_eq!(record.collidable, Collidable::No);
        assert!(!record.fixed);
        assert!(record.link.is_none());
    }

    #[test]
    fn overrides_win_field_by_field() {
        let factory = SceneObjectFactory::with_clock(FixedClock(5));
        let overrides = ObjectOverrides {
            position: Some(Vec3::new(1.0, 0.0, -1.0)),
            collidable: Some(Collidable::Box),
            fixed: Some(true),
            ..ObjectOverrides::local_link("blob:craft/s/1")
        };
        let record = factory.build_object("remote", "seed", Some(overrides));
        assert_eq!(record.position, Vec3::new(1.0, 0.0, -1.0));
        assert_eq!(record.collidable, Collidable::Box);
        assert!(record.fixed);
        assert_eq!(record.link.as_deref(), Some("blob:craft/s/1"));
        assert_eq!(record.scale, Vec3::ONE);
    }

    #[test]
    fn same_inputs_are_deterministic() {
        let factory = SceneObjectFactory::with_clock(FixedClock(42));
        let a = factory.build_object("link", "seed", None);
        let b = factory.build_object("link", "seed", None);
        assert_eq!(a, b);
    }

    #[test]
    fn different_timestamps_yield_distinct_records() {
        let factory = SceneObjectFactory::with_clock(SteppingClock(AtomicI64::new(10)));
        let mut first = factory.build_object("link", "asset", None);
        let second = factory.build_object("link", "asset", None);
        assert_ne!(first.asset_identifier, second.asset_identifier);

        first.position = Vec3::splat(9.0);
        assert_eq!(second.position, Vec3::ZERO);
    }

    #[test]
    fn system_clock_is_close_to_now() {
        let factory = SceneObjectFactory::new();
        let record = factory.build_object("link", "asset", None);
        let millis: i64 = record
            .asset_identifier
            .rsplit('_')
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert!((chrono::Utc::now().timestamp_millis() - millis).abs() < 60_000);
    }
}
