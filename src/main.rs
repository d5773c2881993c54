//! Rigid Collide demo runner
//!
//! Replays the reference scenes under every collision handling mode and
//! prints the outcome. An optional argument names a JSON config file whose
//! tolerances are used instead of the defaults.

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use rigid_collide::sim::CollisionAdvance;
    use rigid_collide::sim::scenarios;
    use rigid_collide::{CollisionHandling, ExtraAccel, SimConfig, SimError};

    env_logger::init();
    log::info!("Rigid Collide demo starting...");

    let base = match std::env::args().nth(1) {
        Some(path) => match SimConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                std::process::exit(1);
            }
        },
        None => SimConfig {
            extra_accel: ExtraAccel::Velocity,
            ..Default::default()
        },
    };

    let run = |handling: CollisionHandling| -> Result<(), SimError> {
        let config = SimConfig {
            collision_handling: handling,
            ..base.clone()
        };

        let mut sim = CollisionAdvance::new(scenarios::block_drop(config.clone())?, 0.025)?;
        let report = sim.run_until(0.2)?;
        let block = &sim.world().bodies()[0];
        println!(
            "  block drop:  v=({:+.3}, {:+.3}) w={:+.3}  collisions={} passes={} backups={}",
            block.vel.x,
            block.vel.y,
            block.angular_vel,
            report.totals.collisions,
            report.totals.passes,
            report.totals.backups
        );

        let mut sim = CollisionAdvance::new(scenarios::three_balls(config)?, 0.025)?;
        let report = sim.run_until(0.2)?;
        let speeds: Vec<String> = sim
            .world()
            .bodies()
            .iter()
            .map(|b| format!("{:+.3}", b.vel.x))
            .collect();
        println!(
            "  three balls: vx=[{}]  collisions={} passes={} KE={:.4}",
            speeds.join(", "),
            report.totals.collisions,
            report.totals.passes,
            sim.world().kinetic_energy()
        );
        Ok(())
    };

    for handling in CollisionHandling::ALL {
        println!("{}:", handling.as_str());
        if let Err(e) = run(handling) {
            log::error!("{} failed: {e}", handling.as_str());
            println!("  failed: {e}");
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}
