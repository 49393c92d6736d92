//! Fault injection scenarios: every peripheral the detector can
//! implicate, plus the escalations that must end in an emergency stop.

use boilerctl::app::service::BoilerService;
use boilerctl::config::BoilerConfig;
use boilerctl::faults::Peripheral;
use boilerctl::mailbox::{Message, MessageKind, ModeReport};

use crate::plant::{
    contains, mode_of, ControlReportModel, LevelSensorModel, Plant, PumpModel,
};

fn make_controller() -> BoilerService {
    BoilerService::new(BoilerConfig::default()).unwrap()
}

/// Controller in NORMAL, level settled, no steam: zero pumps running.
fn settled_no_steam() -> (BoilerService, Plant) {
    let mut controller = make_controller();
    let mut plant = Plant::new(500.0);
    plant.start_into_normal(&mut controller);
    plant.run_healthy(&mut controller, 6);
    (controller, plant)
}

/// Controller in NORMAL at the maximum steam rate: two pumps exactly
/// balance the boil-off and the level holds at the target.
fn settled_max_steam() -> (BoilerService, Plant) {
    let (mut controller, mut plant) = settled_no_steam();
    plant.set_steam(10.0);
    plant.run_healthy(&mut controller, 8);
    assert_eq!(controller.pump_commanded(), &[true, true, false, false]);
    (controller, plant)
}

// ── Level sensor ──────────────────────────────────────────────

#[test]
fn stuck_level_sensor_enters_rescue_on_first_bad_tick() {
    let (mut controller, mut plant) = settled_no_steam();

    plant.set_level_sensor(LevelSensorModel::Stuck(1000.0));
    let out = plant.tick(&mut controller);
    assert!(contains(&out, &Message::LevelFailureDetection));
    assert_eq!(mode_of(&out), Some(ModeReport::Rescue));

    // acknowledgement arrives, rescue continues on predictions
    let out = plant.tick(&mut controller);
    assert_eq!(mode_of(&out), Some(ModeReport::Rescue));

    // plant repairs the sensor: back to normal on the same tick
    plant.set_level_sensor(LevelSensorModel::Accurate);
    plant.send(Message::LevelRepaired);
    let out = plant.tick(&mut controller);
    assert!(contains(&out, &Message::LevelRepairedAcknowledgement));
    assert_eq!(mode_of(&out), Some(ModeReport::Normal));
    assert!(!plant.emergency_seen);
}

#[test]
fn rescue_keeps_the_level_inside_the_band_on_predictions() {
    let (mut controller, mut plant) = settled_no_steam();
    plant.set_level_sensor(LevelSensorModel::Stuck(1000.0));

    // a few blind ticks before the repair lands
    for _ in 0..4 {
        plant.tick(&mut controller);
        assert!(!plant.emergency_seen);
        assert!(plant.level >= 400.0 && plant.level <= 700.0);
    }
}

// ── Pumps ─────────────────────────────────────────────────────

#[test]
fn pump_stuck_closed_is_detected_and_worked_around() {
    let (mut controller, mut plant) = settled_max_steam();

    plant.set_pump(0, PumpModel::StuckOff);
    let detected = plant.run_until(&mut controller, 12, |out| {
        contains(out, &Message::PumpFailureDetection(0))
    });
    assert!(detected, "stuck-closed pump not reported within 12 ticks");
    assert_eq!(plant.last_mode, Some(ModeReport::Degraded));

    // the planner routes around the dead pump and holds the level
    plant.run_healthy(&mut controller, 6);
    assert!(plant.level >= 400.0 && plant.level <= 600.0);
    assert!(!controller.pump_commanded()[0]);

    // repair closes the loop
    plant.set_pump(0, PumpModel::Healthy);
    plant.send(Message::PumpRepaired(0));
    let out = plant.tick(&mut controller);
    assert!(contains(&out, &Message::PumpRepairedAcknowledgement(0)));
    assert_eq!(mode_of(&out), Some(ModeReport::Normal));
}

#[test]
fn half_capacity_pump_is_probed_and_convicted() {
    let (mut controller, mut plant) = settled_max_steam();

    plant.set_pump(0, PumpModel::ReducedHalf);
    // shortfall tick → rescue, probe, conviction of pump 0
    let convicted = plant.run_until(&mut controller, 8, |out| {
        contains(out, &Message::PumpFailureDetection(0))
    });
    assert!(convicted, "reduced pump not convicted");
    assert!(controller.is_faulted(Peripheral::Pump(0)));
    assert!(!controller.is_faulted(Peripheral::LevelSensor));
    assert_eq!(plant.last_mode, Some(ModeReport::Degraded));

    // the reduced pump stays closed while three healthy pumps suffice
    plant.run_healthy(&mut controller, 6);
    assert!(!controller.pump_commanded()[0]);
    assert!(plant.level >= 400.0 && plant.level <= 600.0);
}

#[test]
fn inverted_controller_report_is_deferred_then_blamed() {
    let (mut controller, mut plant) = settled_max_steam();

    plant.set_control_report(0, ControlReportModel::Inverted);
    // first bad tick: ambiguous, nothing emitted yet
    let out = plant.tick(&mut controller);
    assert_eq!(out.count(MessageKind::PumpControlFailureDetection), 0);
    assert_eq!(mode_of(&out), Some(ModeReport::Normal));

    // second tick: no drift, so the controller report takes the blame
    let out = plant.tick(&mut controller);
    assert!(contains(&out, &Message::PumpControlFailureDetection(0)));
    assert_eq!(mode_of(&out), Some(ModeReport::Degraded));

    // ack, then repair
    plant.tick(&mut controller);
    plant.set_control_report(0, ControlReportModel::Accurate);
    plant.send(Message::PumpControlRepaired(0));
    let out = plant.tick(&mut controller);
    assert!(contains(&out, &Message::PumpControlRepairedAcknowledgement(0)));
    assert_eq!(mode_of(&out), Some(ModeReport::Normal));
}

#[test]
fn simultaneous_pump_and_level_faults_are_handled_one_at_a_time() {
    let (mut controller, mut plant) = settled_max_steam();

    plant.set_pump(3, PumpModel::StuckOn);
    plant.set_level_sensor(LevelSensorModel::Offset(10.0));

    let out = plant.tick(&mut controller);
    // exactly one fault is implicated on the bad tick
    assert!(contains(&out, &Message::PumpFailureDetection(3)));
    assert!(!contains(&out, &Message::LevelFailureDetection));
    assert_eq!(mode_of(&out), Some(ModeReport::Degraded));

    // ack lands, plant stays under control around the offset reading
    plant.run_healthy(&mut controller, 3);

    // repair the pump first
    plant.set_pump(3, PumpModel::Healthy);
    plant.send(Message::PumpRepaired(3));
    let reached = plant.run_until(&mut controller, 4, |out| {
        mode_of(out) == Some(ModeReport::Normal)
    });
    assert!(reached, "pump repair should restore NORMAL");

    // repairing the sensor makes the reading jump back by the offset;
    // the controller treats that as a fresh level anomaly, probes, and
    // recovers once the plant confirms the repair
    plant.set_level_sensor(LevelSensorModel::Accurate);
    plant.send(Message::LevelRepaired);
    plant.tick(&mut controller);
    plant.tick(&mut controller);
    plant.send(Message::LevelRepaired);
    let settled = plant.run_until(&mut controller, 10, |out| {
        mode_of(out) == Some(ModeReport::Normal)
    });
    assert!(settled, "both repairs must end in NORMAL");
    assert!(!plant.emergency_seen);
}

#[test]
fn all_pumps_stuck_open_forces_an_emergency_stop() {
    let (mut controller, mut plant) = settled_max_steam();

    for i in 0..4 {
        plant.set_pump(i, PumpModel::StuckOn);
    }
    // 20 litres/second of forced inflow against 10 of steam: the level
    // climbs until the prediction window touches the safety limit
    let stopped = plant.run_until(&mut controller, 15, |out| {
        mode_of(out) == Some(ModeReport::EmergencyStop)
    });
    assert!(stopped, "uncontrollable inflow must emergency-stop");
    // stopped before the water actually left the safety band
    assert!(plant.level <= 900.0);
}

// ── Steam sensor ──────────────────────────────────────────────

#[test]
fn falling_steam_reading_flags_the_sensor() {
    let (mut controller, mut plant) = settled_no_steam();
    plant.set_steam(5.0);
    plant.run_healthy(&mut controller, 4);

    // a reading below the last one is impossible for a healthy sensor
    plant.override_steam_reading(Some(3.0));
    let out = plant.tick(&mut controller);
    assert!(contains(&out, &Message::SteamFailureDetection));
    assert_eq!(mode_of(&out), Some(ModeReport::Degraded));

    // degraded operation plans against the worst-case steam range
    plant.run_healthy(&mut controller, 4);

    plant.override_steam_reading(None);
    plant.send(Message::SteamRepaired);
    let out = plant.tick(&mut controller);
    assert!(contains(&out, &Message::SteamRepairedAcknowledgement));
    assert_eq!(mode_of(&out), Some(ModeReport::Normal));
}

#[test]
fn steam_nonsense_during_rescue_is_fatal() {
    let (mut controller, mut plant) = settled_no_steam();

    plant.set_level_sensor(LevelSensorModel::Stuck(1000.0));
    let out = plant.tick(&mut controller);
    assert_eq!(mode_of(&out), Some(ModeReport::Rescue));
    plant.tick(&mut controller);

    plant.override_steam_reading(Some(-1.0));
    let out = plant.tick(&mut controller);
    assert!(contains(&out, &Message::SteamFailureDetection));
    assert_eq!(mode_of(&out), Some(ModeReport::EmergencyStop));

    // terminal from here on
    let out = plant.tick(&mut controller);
    assert_eq!(mode_of(&out), Some(ModeReport::EmergencyStop));
}

// ── Evacuation valve ──────────────────────────────────────────

#[test]
fn leaking_valve_is_reclassified_from_the_level_anomaly() {
    let (mut controller, mut plant) = settled_max_steam();

    plant.force_valve(true);
    // the drain shows up as a level anomaly first
    let rescued = plant.run_until(&mut controller, 3, |out| {
        contains(out, &Message::LevelFailureDetection)
    });
    assert!(rescued);

    // one tick later the drop matches the evacuation rate exactly and
    // the blame moves to the valve
    let out = plant.tick(&mut controller);
    assert_eq!(mode_of(&out), Some(ModeReport::Degraded));
    assert!(controller.is_faulted(Peripheral::Valve));
    assert!(!controller.is_faulted(Peripheral::LevelSensor));

    // the controller compensates for the leak and holds the level
    for _ in 0..4 {
        let out = plant.tick(&mut controller);
        assert!(!plant.emergency_seen);
        // there is no command that closes a broken valve
        assert_eq!(out.count(MessageKind::Valve), 0);
    }

    // the valve seals again: the level lands a full tick of evacuation
    // above the leak-adjusted prediction and the fault clears
    plant.force_valve(false);
    let recovered = plant.run_until(&mut controller, 3, |out| {
        mode_of(out) == Some(ModeReport::Normal)
    });
    assert!(recovered, "sealed valve should restore NORMAL");
    assert!(!controller.is_faulted(Peripheral::Valve));

    plant.run_healthy(&mut controller, 6);
    assert!(plant.level >= 400.0 && plant.level <= 600.0);
}
