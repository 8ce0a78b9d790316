mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ChannelView, PaintLog, ScriptedFetcher, Seen, drain_until_click, next_seen, urls};
use three_sixty_gallery::events::Direction;
use three_sixty_gallery::gallery::GallerySource;
use three_sixty_gallery::gesture::{GestureInterpreter, PointerEvent, minimum_touch_distance};
use three_sixty_gallery::presenter::{DefaultFlingPhysics, InteractionScheduler};
use tokio::sync::mpsc;

struct Flow {
    gestures: GestureInterpreter,
    scheduler: InteractionScheduler,
    seen: mpsc::UnboundedReceiver<Seen>,
    source: GallerySource,
    renderer: Arc<PaintLog>,
    _requests: mpsc::UnboundedReceiver<common::Request>,
}

async fn flow(frames: usize, physics: DefaultFlingPhysics) -> Flow {
    let (fetcher, requests) = ScriptedFetcher::new();
    let renderer = Arc::new(PaintLog::default());
    let source = GallerySource::new(fetcher, renderer.clone(), 1000);
    let (tx, mut seen) = mpsc::unbounded_channel();
    let scheduler = InteractionScheduler::spawn(ChannelView(tx));
    scheduler.set_fling_physics(Arc::new(physics));
    scheduler.set_source(Some(source.clone()));
    source.set_frame_set(urls("flow", frames));
    for _ in 0..3 {
        assert_eq!(next_seen(&mut seen).await, Seen::Loading(true));
    }

    let gestures = GestureInterpreter::new(
        Arc::new(scheduler.clone()),
        8000.0,
        minimum_touch_distance(1000, 100),
    );
    Flow {
        gestures,
        scheduler,
        seen,
        source,
        renderer,
        _requests: requests,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scrolling_past_the_threshold_drags_one_frame() {
    let mut flow = flow(6, DefaultFlingPhysics::default()).await;

    assert!(!flow.gestures.handle(PointerEvent::Scroll { distance_x: 6.0 }));
    assert!(flow.gestures.handle(PointerEvent::Scroll { distance_x: 4.0 }));
    assert!(flow.gestures.handle(PointerEvent::Scroll { distance_x: -12.0 }));
    assert!(flow.gestures.handle(PointerEvent::Scroll { distance_x: -10.0 }));

    let seen = drain_until_click(&flow.scheduler, &mut flow.seen).await;
    assert_eq!(
        seen,
        vec![
            Seen::Advanced(Direction::Left),
            Seen::Advanced(Direction::Right),
            Seen::Advanced(Direction::Right),
        ]
    );
    assert_eq!(flow.source.current_index(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fling_gesture_spins_and_then_disarms() {
    let mut flow = flow(
        2,
        DefaultFlingPhysics {
            base_delay_ms: 0,
            slowdown_factor: 0.0,
            ..Default::default()
        },
    )
    .await;

    // 2000 px/s is 25% of the maximum: 2 spins over 2 frames
    assert!(flow.gestures.handle(PointerEvent::Fling { velocity_x: 2000.0 }));
    let task = flow.gestures.take_fling_task().unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("fling did not finish")
        .unwrap();

    let seen = drain_until_click(&flow.scheduler, &mut flow.seen).await;
    assert_eq!(seen, vec![Seen::Advanced(Direction::Right); 4]);
    assert_eq!(flow.gestures.current_direction(), Direction::None);
    assert!(!flow.scheduler.is_flinging());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn press_during_fling_stops_it_without_a_click() {
    let mut flow = flow(
        10,
        DefaultFlingPhysics {
            base_delay_ms: 50,
            slowdown_factor: 0.0,
            ..Default::default()
        },
    )
    .await;

    flow.gestures.handle(PointerEvent::Fling { velocity_x: -8000.0 });
    assert_eq!(flow.gestures.current_direction(), Direction::Left);
    tokio::time::timeout(Duration::from_secs(2), async {
        while flow.renderer.count() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("fling never advanced");

    assert!(flow.gestures.handle(PointerEvent::Down));
    assert!(!flow.gestures.handle(PointerEvent::SingleTapUp));
    assert!(!flow.scheduler.is_flinging());

    let task = flow.gestures.take_fling_task().unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("fling loop kept running after the press")
        .unwrap();

    let seen = drain_until_click(&flow.scheduler, &mut flow.seen).await;
    assert!(!seen.is_empty() && seen.len() <= 2, "{seen:?}");
    assert!(seen.iter().all(|s| *s == Seen::Advanced(Direction::Left)));

    // a plain tap afterwards is a frame click again
    assert!(!flow.gestures.handle(PointerEvent::Down));
    assert!(flow.gestures.handle(PointerEvent::SingleTapUp));
    assert_eq!(next_seen(&mut flow.seen).await, Seen::Click);
}
