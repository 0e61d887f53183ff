//! A random-walk avatar, so a headless node has something to publish.

use blockmesh_net::Orientation;
use blockmesh_session::{AvatarSource, AvatarTransform};
use glam::Vec3;
use rand::Rng;

/// Walks at a constant speed, turning a little each step and staying within
/// `radius` of where it started.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    home: Vec3,
    position: Vec3,
    yaw: f32,
    step: f32,
    radius: f32,
}

impl RandomWalk {
    pub fn new(home: Vec3) -> Self {
        Self {
            home,
            position: home,
            yaw: 0.0,
            step: 0.2,
            radius: 16.0,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    fn advance(&mut self) {
        let mut rng = rand::rng();
        self.yaw += rng.random_range(-0.3..=0.3);

        let offset = self.position - self.home;
        if offset.length() > self.radius {
            // Head back home.
            self.yaw = (-offset.x).atan2(-offset.z);
        }
        self.yaw = self.yaw.rem_euclid(std::f32::consts::TAU);

        let heading = Vec3::new(self.yaw.sin(), 0.0, self.yaw.cos());
        self.position += heading * self.step;
    }
}

impl AvatarSource for RandomWalk {
    fn transform(&mut self) -> Option<AvatarTransform> {
        self.advance();
        Some(AvatarTransform {
            position: self.position,
            orientation: Orientation {
                yaw: self.yaw,
                pitch: 0.0,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_moves_one_step_per_tick() {
        let mut walk = RandomWalk::new(Vec3::new(0.0, 5.0, 0.0));
        let before = walk.position();
        let t = walk.transform().unwrap();
        assert!((t.position.distance(before) - 0.2).abs() < 1e-4);
        assert_eq!(t.position.y, 5.0);
    }

    #[test]
    fn test_walk_stays_near_home() {
        let home = Vec3::new(3.0, 5.0, -2.0);
        let mut walk = RandomWalk::new(home);
        for _ in 0..5_000 {
            walk.transform();
            assert!(walk.position().distance(home) <= 16.0 + 0.2 + 1e-3);
        }
    }

    #[test]
    fn test_yaw_stays_in_range() {
        let mut walk = RandomWalk::new(Vec3::ZERO);
        for _ in 0..500 {
            let yaw = walk.transform().unwrap().orientation.yaw;
            assert!((0.0..std::f32::consts::TAU + 1e-4).contains(&yaw));
        }
    }
}
