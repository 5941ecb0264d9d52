// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use std::time::Duration;

use flightsync::test_support::{RecordingRenderer, RenderCall, Reply, ScriptedRemote};
use flightsync::{
    encode_snapshot, Channel, ClientConfig, EngineError, EntityId, FocusState, KinematicState,
    Position, SelectOutcome, Session, StatePush, StoreEvent, Velocity,
};
use serde_json::{json, Value};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn session() -> (
    Arc<RecordingRenderer>,
    Arc<ScriptedRemote>,
    Session<RecordingRenderer>,
) {
    init_logging();
    let renderer = Arc::new(RecordingRenderer::default());
    let remote = Arc::new(ScriptedRemote::default());
    let session = Session::new(ClientConfig::default(), Arc::clone(&renderer), remote.clone());
    (renderer, remote, session)
}

fn state(x: f32, y: f32, heading: f32, speed: f32) -> KinematicState {
    KinematicState {
        position: Position::new(x, y, 0.0),
        heading,
        velocity: Velocity { x: speed, y: 0.0 },
    }
}

fn push(removed: Vec<EntityId>, entities: Vec<(EntityId, KinematicState)>) -> StatePush {
    StatePush {
        removed,
        snapshot: encode_snapshot(entities),
    }
}

fn detail_json(id: EntityId, to: &str) -> Value {
    json!({
        "id": id,
        "flight": { "airline": "Test Air", "code": "TA1", "from": "AAA", "to": to },
        "pos": { "planner": { "past_pos": [[-2.0, 0.0, 0.0], [-1.0, 0.0, 0.0]] } },
    })
}

#[test]
fn test_single_entity_extrapolates_two_seconds() {
    let (_renderer, _remote, session) = session();
    let e1 = EntityId::new_v4();

    let applied = session
        .apply_push(&push(vec![], vec![(e1, state(0.0, 0.0, 0.0, 10.0))]))
        .unwrap();
    assert_eq!(applied, 1);

    let extrapolator = session.extrapolator();
    for _ in 0..20 {
        extrapolator.tick(Duration::from_millis(100));
    }

    let p = session.get(&e1).unwrap().kinematics.position;
    assert!((p.x - 20.0).abs() < 1e-3, "x = {}", p.x);
    assert!(p.y.abs() < 1e-3);
    assert!(p.z.abs() < f32::EPSILON);
}

#[test]
fn test_malformed_push_applies_nothing() {
    let (renderer, _remote, session) = session();
    let keep = EntityId::new_v4();
    session
        .apply_push(&push(vec![], vec![(keep, state(0.0, 0.0, 0.0, 1.0))]))
        .unwrap();
    renderer.clear();

    let mut bad = push(vec![keep], vec![(EntityId::new_v4(), state(5.0, 5.0, 0.0, 1.0))]);
    bad.snapshot.truncate(39);

    let err = session.apply_push(&bad).unwrap_err();
    assert!(matches!(err, EngineError::MalformedSnapshot { len: 39 }));
    assert_eq!(session.len(), 1);
    assert!(session.get(&keep).is_some());
    assert!(renderer.calls().is_empty());
}

#[test]
fn test_push_removes_then_updates() {
    let (renderer, _remote, session) = session();
    let a = EntityId::new_v4();
    let b = EntityId::new_v4();
    let mut events = session.subscribe();

    session
        .apply_push(&push(vec![], vec![(a, state(0.0, 0.0, 0.0, 1.0))]))
        .unwrap();
    session
        .apply_push(&push(vec![a, EntityId::new_v4()], vec![(b, state(1.0, 1.0, 0.0, 1.0))]))
        .unwrap();

    assert!(session.get(&a).is_none());
    assert!(session.get(&b).is_some());
    assert_eq!(renderer.count(|c| matches!(c, RenderCall::Create(..))), 2);
    assert_eq!(renderer.count(|c| matches!(c, RenderCall::Remove(..))), 1);

    assert_eq!(events.try_recv().unwrap(), StoreEvent::EntityAdded(a));
    assert_eq!(events.try_recv().unwrap(), StoreEvent::EntityRemoved(a));
    assert_eq!(events.try_recv().unwrap(), StoreEvent::EntityAdded(b));
}

#[tokio::test]
async fn test_get_detail_cache_and_force() {
    let (_renderer, remote, session) = session();
    let id = EntityId::new_v4();
    session
        .apply_push(&push(vec![], vec![(id, state(0.0, 0.0, 0.0, 1.0))]))
        .unwrap();
    remote.push(Channel::Plane, Reply::ok(detail_json(id, "BBB")));
    remote.push(Channel::Plane, Reply::ok(detail_json(id, "CCC")));

    session.get_detail(id, false).await.unwrap();
    session.get_detail(id, false).await.unwrap();
    assert_eq!(remote.calls(), 1);

    let forced = session.get_detail(id, true).await.unwrap();
    assert_eq!(remote.calls(), 2);
    assert_eq!(forced.flight.to, "CCC");
    assert_eq!(
        session.get(&id).unwrap().detail.unwrap().flight.to,
        "CCC"
    );
}

#[tokio::test]
async fn test_select_seeds_trail_and_follows_updates() {
    let (renderer, remote, session) = session();
    let id = EntityId::new_v4();
    session
        .apply_push(&push(vec![], vec![(id, state(0.0, 0.0, 0.0, 1.0))]))
        .unwrap();
    remote.push(Channel::Plane, Reply::ok(detail_json(id, "BBB")));
    remote.push(
        Channel::Airport,
        Reply::ok(json!({
            "id": "BBB",
            "airport": {
                "name": "Bravo",
                "code": "BBB",
                "runways": [{ "name": "09", "start": [90.0, 0.0], "end": [110.0, 0.0] }],
            },
        })),
    );

    let outcome = session.select(id).await.unwrap();
    assert!(matches!(outcome, SelectOutcome::Focused(ref d) if d.flight.to == "BBB"));
    assert_eq!(session.focus(), FocusState::Focused(id));
    assert_eq!(
        session.trail(),
        vec![
            Position::new(-2.0, 0.0, 0.0),
            Position::new(-1.0, 0.0, 0.0),
            Position::ORIGIN,
        ]
    );
    // trail plus destination guide
    assert_eq!(renderer.count(|c| matches!(c, RenderCall::DrawTrail(..))), 2);

    session
        .apply_push(&push(vec![], vec![(id, state(1.0, 0.0, 0.0, 1.0))]))
        .unwrap();
    session.extrapolator().tick(Duration::from_secs(1));

    let trail = session.trail();
    assert_eq!(trail.len(), 5);
    assert_eq!(trail[3], Position::new(1.0, 0.0, 0.0));
    assert!((trail[4].x - 2.0).abs() < 1e-5);
    assert!(renderer.calls().iter().any(|c| matches!(
        c,
        RenderCall::UpdateTrail(_, points)
            if points.len() == 2 && points[0] == Position::new(100.0, 0.0, 0.0)
    )));

    assert!(session.deselect());
    assert_eq!(session.focus(), FocusState::Idle);
    assert!(session.trail().is_empty());
    assert_eq!(renderer.count(|c| matches!(c, RenderCall::RemoveTrail(..))), 2);
}

#[tokio::test(start_paused = true)]
async fn test_late_detail_does_not_steal_focus() {
    let (renderer, remote, session) = session();
    let a = EntityId::new_v4();
    let b = EntityId::new_v4();
    session
        .apply_push(&push(
            vec![],
            vec![(a, state(0.0, 0.0, 0.0, 1.0)), (b, state(5.0, 5.0, 0.0, 1.0))],
        ))
        .unwrap();
    remote.push(
        Channel::Plane,
        Reply::ok(detail_json(a, "AAA")).after(Duration::from_secs(2)),
    );
    remote.push(Channel::Plane, Reply::ok(detail_json(b, "BBB")));

    let (first, second) = tokio::join!(session.select(a), async {
        tokio::task::yield_now().await;
        session.select(b).await
    });

    assert_eq!(first.unwrap(), SelectOutcome::Superseded);
    assert!(matches!(second.unwrap(), SelectOutcome::Focused(_)));
    assert_eq!(session.focus(), FocusState::Focused(b));
    assert_eq!(renderer.count(|c| matches!(c, RenderCall::DrawTrail(..))), 1);
    // A's detail is still cached on its own record
    assert_eq!(session.get(&a).unwrap().detail.unwrap().flight.to, "AAA");
}

#[test]
fn test_deselect_when_idle_is_noop() {
    let (renderer, _remote, session) = session();
    assert!(!session.deselect());
    assert_eq!(session.focus(), FocusState::Idle);
    assert!(renderer.calls().is_empty());
}

#[tokio::test]
async fn test_select_failure_leaves_idle() {
    let (_renderer, remote, session) = session();
    let id = EntityId::new_v4();
    session
        .apply_push(&push(vec![], vec![(id, state(0.0, 0.0, 0.0, 1.0))]))
        .unwrap();
    remote.push(Channel::Plane, Reply::err("socket closed"));

    let err = session.select(id).await.unwrap_err();
    assert!(matches!(err, EngineError::DetailFetchFailed { .. }));
    assert_eq!(session.focus(), FocusState::Idle);

    let unknown = EntityId::new_v4();
    assert!(matches!(
        session.select(unknown).await,
        Err(EngineError::UnknownEntity(missing)) if missing == unknown
    ));
}

#[tokio::test(start_paused = true)]
async fn test_entity_removed_during_select() {
    let (_renderer, remote, session) = session();
    let id = EntityId::new_v4();
    session
        .apply_push(&push(vec![], vec![(id, state(0.0, 0.0, 0.0, 1.0))]))
        .unwrap();
    remote.push(
        Channel::Plane,
        Reply::ok(detail_json(id, "BBB")).after(Duration::from_secs(1)),
    );

    let (result, ()) = tokio::join!(session.select(id), async {
        tokio::task::yield_now().await;
        session.apply_push(&push(vec![id], vec![])).unwrap();
    });

    assert!(matches!(result, Err(EngineError::UnknownEntity(missing)) if missing == id));
    assert_eq!(session.focus(), FocusState::Idle);
    assert!(session.is_empty());
}

#[tokio::test]
async fn test_removing_focused_entity_deselects() {
    let (renderer, remote, session) = session();
    let id = EntityId::new_v4();
    session
        .apply_push(&push(vec![], vec![(id, state(0.0, 0.0, 0.0, 1.0))]))
        .unwrap();
    remote.push(Channel::Plane, Reply::ok(detail_json(id, "BBB")));
    session.select(id).await.unwrap();

    session.apply_push(&push(vec![id], vec![])).unwrap();
    assert_eq!(session.focus(), FocusState::Idle);
    assert_eq!(renderer.count(|c| matches!(c, RenderCall::RemoveTrail(..))), 1);
}

#[tokio::test]
async fn test_run_pushes_skips_malformed() {
    let (_renderer, _remote, session) = session();
    let (tx, rx) = session.push_channel();
    let a = EntityId::new_v4();
    let b = EntityId::new_v4();

    tx.send(push(vec![], vec![(a, state(0.0, 0.0, 0.0, 1.0))]))
        .await
        .unwrap();
    tx.send(StatePush {
        removed: vec![a],
        snapshot: vec![0; 7],
    })
    .await
    .unwrap();
    tx.send(push(vec![], vec![(b, state(0.0, 0.0, 0.0, 1.0))]))
        .await
        .unwrap();
    drop(tx);

    session.run_pushes(rx).await;
    assert_eq!(session.len(), 2);
}

#[tokio::test]
async fn test_reference_data_passthrough() {
    let (_renderer, remote, session) = session();
    let id = EntityId::new_v4();
    remote.push(Channel::WorldData, Reply::ok(json!({ "airports": [] })));
    remote.push(Channel::AirportArrivals, Reply::ok(json!([id])));

    assert!(session.world_data().await.unwrap().airports.is_empty());
    assert_eq!(session.airport_arrivals("BBB").await.unwrap(), vec![id]);
    assert!(session.simulation_config().await.is_err());
}
