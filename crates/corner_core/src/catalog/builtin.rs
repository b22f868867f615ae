//! Built-in corner case definitions
//!
//! 32개 내장 정의. 좌표는 실행 계획의 anchor 기준 상대 오프셋(월드 축)이며,
//! ego는 +x 방향으로 anchor에 접근하고 도로 가장자리는 y = ±5m 정도를 가정한다.
//!
//! | ids    | category              |
//! |--------|-----------------------|
//! | 1-11   | StateAnomaly          |
//! | 12-24  | BehaviorAnomaly       |
//! | 25-32  | EvidenceBasedAnomaly  |

use nalgebra::Vector3;
use once_cell::sync::Lazy;
use std::sync::Arc;

use super::params::ParamSpec;
use super::types::{
    ActorRole, CategoryProfile, CornerCaseDefinition, EvidenceCue, Maneuver, StateAnomaly,
};
use crate::choreography::script::{BlueprintSpec, OffsetSpec, Scalar, ScriptSpec};
use crate::world::ActorKind;

static BUILTIN: Lazy<Vec<Arc<CornerCaseDefinition>>> =
    Lazy::new(|| build_all().into_iter().map(Arc::new).collect());

/// All built-in definitions in identifier order
pub fn definitions() -> &'static [Arc<CornerCaseDefinition>] {
    &BUILTIN
}

const KIDS: [&str; 8] = [
    "walker.pedestrian.0009",
    "walker.pedestrian.0010",
    "walker.pedestrian.0011",
    "walker.pedestrian.0012",
    "walker.pedestrian.0013",
    "walker.pedestrian.0014",
    "walker.pedestrian.0048",
    "walker.pedestrian.0049",
];

const ADULTS: [&str; 7] = [
    "walker.pedestrian.0004",
    "walker.pedestrian.0016",
    "walker.pedestrian.0017",
    "walker.pedestrian.0028",
    "walker.pedestrian.0029",
    "walker.pedestrian.0046",
    "walker.pedestrian.0047",
];

const OFFICERS: [&str; 2] = ["walker.pedestrian.0030", "walker.pedestrian.0032"];

fn dir(x: f64, y: f64) -> Vector3<f64> {
    Vector3::new(x, y, 0.0)
}

fn prop(name: &str, blueprint: &str) -> ActorRole {
    ActorRole::new(name, ActorKind::Prop, BlueprintSpec::fixed(blueprint))
}

fn vehicle(name: &str, blueprint: &str) -> ActorRole {
    ActorRole::new(name, ActorKind::Vehicle, BlueprintSpec::fixed(blueprint))
}

fn animal(name: &str, blueprint: &str) -> ActorRole {
    ActorRole::new(name, ActorKind::Animal, BlueprintSpec::fixed(blueprint))
}

fn walker(name: &str, blueprint: BlueprintSpec) -> ActorRole {
    ActorRole::new(name, ActorKind::Pedestrian, blueprint)
}

fn walk(x: f64, y: f64, speed: impl Into<Scalar>) -> ScriptSpec {
    ScriptSpec::Walk { direction: dir(x, y), speed: speed.into() }
}

fn drive(x: f64, y: f64, speed: impl Into<Scalar>, stop_after_m: Option<Scalar>) -> ScriptSpec {
    ScriptSpec::Drive { direction: dir(x, y), speed: speed.into(), stop_after_m }
}

fn build_all() -> Vec<CornerCaseDefinition> {
    let mut defs = state_anomalies();
    defs.extend(behavior_anomalies());
    defs.extend(evidence_anomalies());
    defs
}

// ============================================================================
// State anomalies (1-11)
// ============================================================================

fn state_anomalies() -> Vec<CornerCaseDefinition> {
    use StateAnomaly::*;

    vec![
        CornerCaseDefinition::builder(
            1,
            "stop-sign-occluded",
            "Stop sign at the roadside hidden behind a parked truck until the last moment",
            CategoryProfile::state(Occlusion, false),
        )
        .role(prop("sign", "static.prop.stopsign").at(0.0, 5.0).facing(180.0))
        .role(
            vehicle("occluder", "vehicle.carlamotors.european_hgv")
                .at_offset(OffsetSpec { x: "occluder_x_m".into(), y: "occluder_lateral_m".into(), z: 0.0 }),
        )
        .param(ParamSpec::float("occluder_x_m", -20.0, -4.0, -8.0))
        .param(ParamSpec::float("occluder_lateral_m", 2.5, 8.0, 3.5))
        .build(),
        CornerCaseDefinition::builder(
            2,
            "sudden-sign-ahead-right",
            "'Ahead or right only' sign appears where the road continues straight",
            CategoryProfile::state(AlteredSignage, false),
        )
        .role(prop("sign", "static.prop.sign_ahead_right_only").at(0.0, 4.5).facing(180.0))
        .build(),
        CornerCaseDefinition::builder(
            3,
            "changed-road-texture",
            "Road surface patch with an unfamiliar texture across the ego lane",
            CategoryProfile::state(AlteredSurface, true),
        )
        .role(prop("patch_near", "static.prop.ironplank").at(0.0, 0.0))
        .role(prop("patch_far", "static.prop.ironplank").at(3.0, 0.0))
        .build(),
        CornerCaseDefinition::builder(
            4,
            "fallen-tree",
            "Tree lying across the ego lane",
            CategoryProfile::state(StaticObstacle, true),
        )
        .role(
            prop("tree", "static.prop.beech_tree")
                .at_offset(OffsetSpec { x: Scalar::Fixed(0.0), y: "tree_lateral_m".into(), z: 0.0 })
                .facing(90.0),
        )
        .param(ParamSpec::float("tree_lateral_m", -2.0, 2.0, 0.0))
        .build(),
        CornerCaseDefinition::builder(
            5,
            "static-car-crash-front",
            "Two crashed cars blocking the lane with a warning triangle before them",
            CategoryProfile::state(StaticObstacle, true),
        )
        .role(vehicle("car_a", "vehicle.citroen.c3").at(0.0, 0.5).facing(30.0))
        .role(vehicle("car_b", "vehicle.mercedes.coupe_2020").at(3.5, -0.8).facing(200.0))
        .role(prop("warning", "static.prop.trafficwarning").at(-15.0, 0.0))
        .build(),
        CornerCaseDefinition::builder(
            6,
            "static-car-crash-police",
            "Crashed car secured by a police car with an officer standing next to it",
            CategoryProfile::state(StaticObstacle, true),
        )
        .role(vehicle("wreck", "vehicle.nissan.patrol_2021").at(0.0, 0.0).facing(150.0))
        .role(vehicle("police", "vehicle.dodge.charger_police_2020").at(8.0, 3.5))
        .role(walker("officer", BlueprintSpec::pick(&OFFICERS)).at(5.0, 2.5).facing(180.0))
        .build(),
        CornerCaseDefinition::builder(
            7,
            "ems-obstacle",
            "Ambulance and fire truck parked in the lane at an incident",
            CategoryProfile::state(StaticObstacle, true),
        )
        .role(vehicle("ambulance", "vehicle.ford.ambulance").at(0.0, 1.0))
        .role(vehicle("firetruck", "vehicle.carlamotors.firetruck").at(12.0, 1.5))
        .role(prop("cone", "static.prop.constructioncone").at(-6.0, 0.5))
        .build(),
        CornerCaseDefinition::builder(
            8,
            "roadworks-with-workers",
            "Roadworks van with cones, a warning sign and a worker on the lane edge",
            CategoryProfile::state(StaticObstacle, true),
        )
        .role(vehicle("van", "vehicle.mercedes.sprinter").at(0.0, 1.5))
        .role(prop("sign", "static.prop.warningconstruction").at(-20.0, 1.5))
        .role(prop("cone_far", "static.prop.constructioncone").at(-10.0, 0.8))
        .role(prop("cone_near", "static.prop.constructioncone").at(-5.0, 0.4))
        .role(walker("worker", BlueprintSpec::pick(&ADULTS)).at(2.0, 0.0).facing(90.0))
        .build(),
        CornerCaseDefinition::builder(
            9,
            "parking-hgv",
            "Heavy goods vehicle parked half in the ego lane",
            CategoryProfile::state(StaticObstacle, true),
        )
        .role(
            vehicle("hgv", "vehicle.carlamotors.european_hgv")
                .at_offset(OffsetSpec { x: Scalar::Fixed(0.0), y: "hgv_lateral_m".into(), z: 0.0 }),
        )
        .param(ParamSpec::float("hgv_lateral_m", 1.0, 4.0, 2.0))
        .build(),
        CornerCaseDefinition::builder(
            10,
            "dangerous-excavator",
            "Excavator at the roadside with its arm swung over the lane",
            CategoryProfile::state(StaticObstacle, false),
        )
        .role(prop("base", "static.prop.excavator_bottom").at(0.0, 3.5))
        .role(prop("arm", "static.prop.excavator_top").at(0.0, 3.5).facing(90.0))
        .role(prop("barrier", "static.prop.streetbarrier").at(-4.0, 2.0))
        .build(),
        CornerCaseDefinition::builder(
            11,
            "shopping-cart-highway",
            "Abandoned shopping cart standing on a fast road",
            CategoryProfile::state(StaticObstacle, true),
        )
        .role(
            prop("cart", "static.prop.shoppingcart")
                .at_offset(OffsetSpec { x: Scalar::Fixed(0.0), y: "cart_lateral_m".into(), z: 0.0 }),
        )
        .param(ParamSpec::float("cart_lateral_m", -1.5, 1.5, 0.0))
        .build(),
    ]
}

// ============================================================================
// Behavior anomalies (12-24)
// ============================================================================

fn behavior_anomalies() -> Vec<CornerCaseDefinition> {
    use Maneuver::*;

    vec![
        CornerCaseDefinition::builder(
            12,
            "unpredictable-pedestrian",
            "Pedestrian steps onto the road, hesitates and runs back to the curb",
            CategoryProfile::behavior(Crossing, "walker"),
        )
        .role(
            walker("walker", BlueprintSpec::pick(&ADULTS)).at(0.0, 5.0).facing(270.0).script(
                ScriptSpec::CrossAndReturn {
                    direction: dir(0.0, -1.0),
                    speed: "walk_speed_mps".into(),
                    turn_after_m: "turn_after_m".into(),
                    return_speed: "walk_speed_mps".into(),
                },
            ),
        )
        .param(ParamSpec::float("walk_speed_mps", 0.5, 4.0, 1.8))
        .param(ParamSpec::float("turn_after_m", 2.0, 9.0, 4.0))
        .build(),
        CornerCaseDefinition::builder(
            13,
            "unpredictable-bicycle",
            "Cyclist swerves from the curb into the ego lane",
            CategoryProfile::behavior(Swerving, "cyclist"),
        )
        .role(
            ActorRole::new(
                "cyclist",
                ActorKind::Bicycle,
                BlueprintSpec::pick(&["vehicle.bh.crossbike", "vehicle.diamondback.century", "vehicle.gazelle.omafiets"]),
            )
            .at(10.0, 3.0)
            .facing(180.0)
            .script(drive(-1.0, -0.3, "bike_speed_mps", None)),
        )
        .param(ParamSpec::float("bike_speed_mps", 2.0, 8.0, 4.5))
        .build(),
        CornerCaseDefinition::builder(
            14,
            "squirrel-running-across",
            "Squirrel darts across the road in front of the ego",
            CategoryProfile::behavior(Crossing, "squirrel"),
        )
        .role(
            animal("squirrel", "static.prop.ai_squirrel")
                .at(0.0, 5.0)
                .facing(270.0)
                .script(walk(0.0, -1.0, "run_speed_mps")),
        )
        .param(ParamSpec::float("run_speed_mps", 1.0, 6.0, 3.0))
        .build(),
        CornerCaseDefinition::builder(
            15,
            "loose-zoo-animals",
            "Gorilla and gazelle escaped from a zoo crossing from both sides",
            CategoryProfile::behavior(Crossing, "gorilla"),
        )
        .role(animal("gorilla", "static.prop.ai_gorilla").at(0.0, 6.0).facing(270.0).script(walk(0.0, -1.0, 1.2)))
        .role(
            animal("gazelle", "static.prop.ai_gazelle")
                .at(6.0, -6.0)
                .facing(90.0)
                .script(walk(0.0, 1.0, "gazelle_speed_mps")),
        )
        .param(ParamSpec::float("gazelle_speed_mps", 2.0, 10.0, 5.0))
        .build(),
        CornerCaseDefinition::builder(
            16,
            "cow-and-pedestrian-crossing",
            "Farmer leading a cow slowly across the road",
            CategoryProfile::behavior(Crossing, "cow"),
        )
        .role(animal("cow", "static.prop.ai_cow").at(0.0, 6.0).facing(270.0).script(walk(0.0, -1.0, 0.8)))
        .role(
            walker("farmer", BlueprintSpec::fixed("walker.pedestrian.0036"))
                .at(-2.0, 7.0)
                .facing(270.0)
                .script(walk(0.0, -1.0, 0.8)),
        )
        .build(),
        CornerCaseDefinition::builder(
            17,
            "car-in-opposite-direction",
            "Oncoming car driving in the ego lane",
            CategoryProfile::behavior(WrongWay, "oncoming"),
        )
        .role(
            vehicle("oncoming", "vehicle.lincoln.mkz_2020")
                .at(40.0, 0.0)
                .facing(180.0)
                .script(drive(-1.0, 0.0, "oncoming_speed_mps", None)),
        )
        .param(ParamSpec::float("oncoming_speed_mps", 5.0, 20.0, 10.0))
        .build(),
        CornerCaseDefinition::builder(
            18,
            "car-forward-dropoff",
            "Taxi ahead stops abruptly in the lane to drop off a passenger",
            CategoryProfile::behavior(SuddenStop, "taxi"),
        )
        .role(
            vehicle("taxi", "vehicle.ford.crown")
                .at(0.0, 0.0)
                .script(drive(1.0, 0.0, 8.0, Some("stop_after_m".into()))),
        )
        .param(ParamSpec::float("stop_after_m", 5.0, 40.0, 15.0))
        .build(),
        CornerCaseDefinition::builder(
            19,
            "car-forward-parking",
            "Car ahead brakes and pulls into a roadside parking spot",
            CategoryProfile::behavior(SuddenStop, "parker"),
        )
        .role(
            vehicle("parker", "vehicle.mini.cooper_s_2021")
                .at(0.0, 0.0)
                .script(drive(1.0, 0.35, 5.0, Some(Scalar::Fixed(12.0)))),
        )
        .build(),
        CornerCaseDefinition::builder(
            20,
            "falling-barrel",
            "Barrel falls off a van driving ahead",
            CategoryProfile::behavior(FallingObject, "barrel"),
        )
        .role(vehicle("van", "vehicle.mercedes.sprinter").at(10.0, 0.0).script(drive(1.0, 0.0, 6.0, None)))
        .role(
            prop("barrel", "static.prop.barrel")
                .at(6.0, 0.0)
                .script(ScriptSpec::Impulse { impulse: Vector3::new(-40.0, 0.0, 15.0) }),
        )
        .build(),
        CornerCaseDefinition::builder(
            21,
            "car-with-item-briefcase",
            "Box slides off the roof of the car ahead",
            CategoryProfile::behavior(FallingObject, "item"),
        )
        .role(vehicle("car", "vehicle.mercedes.coupe_2020").at(10.0, 0.0).script(drive(1.0, 0.0, 7.0, None)))
        .role(
            prop("item", "static.prop.box03")
                .at(8.0, 0.0)
                .script(ScriptSpec::Impulse { impulse: Vector3::new(-5.0, 0.0, 2.0) }),
        )
        .build(),
        CornerCaseDefinition::builder(
            22,
            "pedestrian-intercept",
            "Pedestrian times the crossing to meet the ego's front bumper",
            CategoryProfile::behavior(Intercept, "walker"),
        )
        .role(
            walker(
                "walker",
                BlueprintSpec::pick(&[
                    "walker.pedestrian.0018",
                    "walker.pedestrian.0019",
                    "walker.pedestrian.0020",
                    "walker.pedestrian.0021",
                    "walker.pedestrian.0022",
                    "walker.pedestrian.0023",
                ]),
            )
            .at(0.0, 6.0)
            .facing(270.0)
            .script(ScriptSpec::InterceptEgo { direction: dir(0.0, -1.0), min_speed: "min_speed_mps".into() }),
        )
        .param(ParamSpec::float("min_speed_mps", 0.5, 3.0, 1.0))
        .build(),
        CornerCaseDefinition::builder(
            23,
            "jaywalking-pair",
            "Two pedestrians cross away from any crossing",
            CategoryProfile::behavior(Crossing, "lead"),
        )
        .role(walker("lead", BlueprintSpec::pick(&ADULTS)).at(0.0, -6.0).facing(90.0).script(walk(0.0, 1.0, 1.4)))
        .role(walker("follower", BlueprintSpec::pick(&ADULTS)).at(1.0, -6.5).facing(90.0).script(walk(0.0, 1.0, 1.2)))
        .build(),
        CornerCaseDefinition::builder(
            24,
            "cut-in-vehicle",
            "Car from the neighbouring lane cuts in right in front of the ego",
            CategoryProfile::behavior(CutIn, "cutter"),
        )
        .role(
            vehicle("cutter", "vehicle.mercedes.coupe_2020")
                .at(-5.0, 3.5)
                .script(drive(1.0, -0.25, "cut_in_speed_mps", None)),
        )
        .param(ParamSpec::float("cut_in_speed_mps", 8.0, 20.0, 12.0))
        .build(),
    ]
}

// ============================================================================
// Evidence-based anomalies (25-32)
// ============================================================================

fn evidence_anomalies() -> Vec<CornerCaseDefinition> {
    use EvidenceCue::*;

    vec![
        CornerCaseDefinition::builder(
            25,
            "ball-boy",
            "Football rolls onto the road between parked cars, a child runs after it",
            CategoryProfile::evidence(Ball, "ball", Some("kid")),
        )
        .role(
            prop("ball", "static.prop.football")
                .at(0.0, 5.5)
                .script(ScriptSpec::Impulse { impulse: Vector3::new(0.0, -25.0, 10.0) }),
        )
        .role(
            walker("kid", BlueprintSpec::FromParam("kid_blueprint".into()))
                .at(0.1, 10.3)
                .facing(270.0)
                .script(ScriptSpec::CrossAndReturn {
                    direction: dir(0.0, -1.0),
                    speed: "kid_speed_mps".into(),
                    turn_after_m: Scalar::Fixed(16.4),
                    return_speed: "kid_speed_mps".into(),
                }),
        )
        .role(vehicle("parked_front", "vehicle.tesla.cybertruck").at(-4.2, 3.7))
        .role(vehicle("parked_mid", "vehicle.nissan.patrol_2021").at(-10.7, 4.0))
        .role(vehicle("parked_rear", "vehicle.mercedes.sprinter").at(-17.6, 4.2))
        .param(ParamSpec::choice("kid_blueprint", &KIDS[..4]))
        .param(ParamSpec::float("kid_speed_mps", 1.0, 5.0, 3.5))
        .build(),
        CornerCaseDefinition::builder(
            26,
            "pedestrian-calling-dog",
            "Owner on one side calls a dog that runs across from the other side",
            CategoryProfile::evidence(CallingPerson, "owner", Some("dog")),
        )
        .role(walker("owner", BlueprintSpec::fixed("walker.pedestrian.0001")).at(0.0, -6.0).facing(90.0))
        .role(
            animal("dog", "static.prop.ai_german_shepard")
                .at(0.0, 6.0)
                .facing(270.0)
                .script(walk(0.0, -1.0, "dog_speed_mps")),
        )
        .param(ParamSpec::float("dog_speed_mps", 1.0, 8.0, 4.0))
        .build(),
        CornerCaseDefinition::builder(
            27,
            "bus-stop-near-playground",
            "Bus at a stop next to a playground, a child crosses behind it",
            CategoryProfile::evidence(Playground, "bus", Some("child")),
        )
        .role(vehicle("bus", "vehicle.mitsubishi.fusorosa").at(0.0, 3.5))
        .role(
            walker("child", BlueprintSpec::pick(&KIDS))
                .at(6.0, 5.0)
                .facing(270.0)
                .script(walk(0.0, -1.0, "child_speed_mps")),
        )
        .param(ParamSpec::float("child_speed_mps", 0.8, 4.0, 2.0))
        .build(),
        CornerCaseDefinition::builder(
            28,
            "ball-without-follower",
            "Ball bounces across the road, nobody follows",
            CategoryProfile::evidence(Ball, "ball", None),
        )
        .role(
            prop("ball", "static.prop.football")
                .at(0.0, 5.0)
                .script(ScriptSpec::Impulse { impulse: Vector3::new(0.0, -20.0, 5.0) }),
        )
        .build(),
        CornerCaseDefinition::builder(
            29,
            "police-officer-directing",
            "Officer standing in the lane next to a police car, directing traffic",
            CategoryProfile::evidence(Gesture, "officer", None),
        )
        .role(vehicle("police", "vehicle.dodge.charger_police_2020").at(5.0, 3.5))
        .role(walker("officer", BlueprintSpec::pick(&OFFICERS)).at(0.0, 0.5).facing(180.0))
        .build(),
        CornerCaseDefinition::builder(
            30,
            "stopped-bus-hidden-child",
            "Child steps out from behind a bus stopped in the opposite lane",
            CategoryProfile::evidence(OccludingVehicle, "bus", Some("child")),
        )
        .role(vehicle("bus", "vehicle.mitsubishi.fusorosa").at(0.0, -3.5).facing(180.0))
        .role(
            walker("child", BlueprintSpec::pick(&KIDS))
                .at(2.0, -6.0)
                .facing(90.0)
                .script(walk(0.0, 1.0, "child_speed_mps")),
        )
        .param(ParamSpec::float("child_speed_mps", 1.0, 4.0, 2.5))
        .build(),
        CornerCaseDefinition::builder(
            31,
            "parked-car-driver-exit",
            "Driver gets out of a parked car on the traffic side",
            CategoryProfile::evidence(OccludingVehicle, "car", Some("driver")),
        )
        .role(vehicle("car", "vehicle.nissan.patrol_2021").at(0.0, 3.0))
        .role(
            walker("driver", BlueprintSpec::fixed("walker.pedestrian.0016"))
                .at(1.5, 2.0)
                .facing(270.0)
                .script(walk(0.0, -1.0, 1.2)),
        )
        .build(),
        CornerCaseDefinition::builder(
            32,
            "ems-outgoing",
            "Ambulance leaving a station driveway pulls across the road",
            CategoryProfile::evidence(EmergencyVehicle, "ambulance", None),
        )
        .role(
            vehicle("ambulance", "vehicle.ford.ambulance")
                .at(0.0, 8.0)
                .facing(270.0)
                .script(drive(0.0, -1.0, "exit_speed_mps", Some(Scalar::Fixed(8.0)))),
        )
        .param(ParamSpec::float("exit_speed_mps", 3.0, 12.0, 6.0))
        .build(),
    ]
}
