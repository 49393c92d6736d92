//! Repair / acknowledgement handshake: the detection → ack → repaired →
//! repaired-ack round trip, rogue messages, and the bookkeeping
//! invariants around it.

use boilerctl::app::service::BoilerService;
use boilerctl::config::BoilerConfig;
use boilerctl::faults::Peripheral;
use boilerctl::mailbox::{Message, ModeReport};

use crate::plant::{contains, mode_of, Plant, PumpModel};

fn make_controller() -> BoilerService {
    BoilerService::new(BoilerConfig::default()).unwrap()
}

/// Degraded on a stuck-closed pump 0, two pumps balancing max steam.
fn degraded_on_pump0(auto_ack: bool) -> (BoilerService, Plant) {
    let mut controller = make_controller();
    let mut plant = Plant::new(500.0);
    plant.start_into_normal(&mut controller);
    plant.run_healthy(&mut controller, 6);
    plant.set_steam(10.0);
    plant.run_healthy(&mut controller, 8);

    plant.auto_ack = auto_ack;
    plant.set_pump(0, PumpModel::StuckOff);
    let detected = plant.run_until(&mut controller, 3, |out| {
        contains(out, &Message::PumpFailureDetection(0))
    });
    assert!(detected);
    (controller, plant)
}

#[test]
fn detection_ack_repair_round_trip_restores_normal() {
    let (mut controller, mut plant) = degraded_on_pump0(true);

    // ack arrives one tick after the report
    plant.tick(&mut controller);

    plant.set_pump(0, PumpModel::Healthy);
    plant.send(Message::PumpRepaired(0));
    let out = plant.tick(&mut controller);
    assert!(contains(&out, &Message::PumpRepairedAcknowledgement(0)));
    assert_eq!(mode_of(&out), Some(ModeReport::Normal));
    // the slot is clean before the next tick begins
    assert!(!controller.is_faulted(Peripheral::Pump(0)));
}

#[test]
fn repair_without_acknowledgement_is_ignored() {
    let (mut controller, mut plant) = degraded_on_pump0(false);

    // no ack was ever sent; the repair claim is rogue
    plant.send(Message::PumpRepaired(0));
    let out = plant.tick(&mut controller);
    assert!(!contains(&out, &Message::PumpRepairedAcknowledgement(0)));
    assert_eq!(mode_of(&out), Some(ModeReport::Degraded));
    assert!(controller.is_faulted(Peripheral::Pump(0)));

    // once the ack lands the same repair goes through
    plant.send(Message::PumpFailureAcknowledgement(0));
    plant.tick(&mut controller);
    plant.set_pump(0, PumpModel::Healthy);
    plant.send(Message::PumpRepaired(0));
    let out = plant.tick(&mut controller);
    assert!(contains(&out, &Message::PumpRepairedAcknowledgement(0)));
    assert_eq!(mode_of(&out), Some(ModeReport::Normal));
}

#[test]
fn rogue_acknowledgements_are_no_ops() {
    let (mut controller, mut plant) = degraded_on_pump0(true);
    plant.tick(&mut controller);

    // acks for peripherals that never failed
    plant.send(Message::PumpFailureAcknowledgement(2));
    plant.send(Message::LevelFailureAcknowledgement);
    let out = plant.tick(&mut controller);
    assert_eq!(mode_of(&out), Some(ModeReport::Degraded));
    assert!(!plant.emergency_seen);
    assert!(!controller.is_faulted(Peripheral::Pump(2)));
    assert!(!controller.is_faulted(Peripheral::LevelSensor));
}

#[test]
fn repaired_in_normal_is_ignored() {
    let mut controller = make_controller();
    let mut plant = Plant::new(500.0);
    plant.start_into_normal(&mut controller);
    plant.run_healthy(&mut controller, 4);

    plant.send(Message::PumpRepaired(1));
    plant.send(Message::LevelRepaired);
    let out = plant.tick(&mut controller);
    assert_eq!(mode_of(&out), Some(ModeReport::Normal));
    assert!(!contains(&out, &Message::PumpRepairedAcknowledgement(1)));
    assert!(!contains(&out, &Message::LevelRepairedAcknowledgement));
}

#[test]
fn commanded_record_mirrors_emitted_commands() {
    let mut controller = make_controller();
    let mut plant = Plant::new(500.0);
    plant.start_into_normal(&mut controller);

    // with a healthy plant the controller's record and the plant's view
    // of received commands never diverge
    for tick in 0..20 {
        if tick == 8 {
            plant.set_steam(6.0);
        }
        plant.tick(&mut controller);
        assert_eq!(controller.pump_commanded(), plant.commanded());
    }
}

#[test]
fn order_of_ack_and_repair_across_two_faults_does_not_matter() {
    let (mut controller, mut plant) = degraded_on_pump0(true);
    plant.tick(&mut controller); // ack pump 0

    // a second, independent fault while degraded
    plant.set_pump(2, PumpModel::StuckOff);
    let detected = plant.run_until(&mut controller, 3, |out| {
        contains(out, &Message::PumpFailureDetection(2))
    });
    assert!(detected);
    plant.tick(&mut controller); // ack pump 2

    // repair in the opposite order of detection
    plant.set_pump(2, PumpModel::Healthy);
    plant.send(Message::PumpRepaired(2));
    let out = plant.tick(&mut controller);
    assert_eq!(mode_of(&out), Some(ModeReport::Degraded));

    plant.set_pump(0, PumpModel::Healthy);
    plant.send(Message::PumpRepaired(0));
    let out = plant.tick(&mut controller);
    assert_eq!(mode_of(&out), Some(ModeReport::Normal));
    assert!(!plant.emergency_seen);
}
