use std::time::Duration;

use fuurin::event::{Notification, Type as EvtType};
use fuurin::part::Part;
use fuurin::topic::{Kind as TopicKind, Name};
use fuurin::{Broker, Id, Worker};

const WAIT: Duration = Duration::from_secs(5);

fn endpoints(delivery: u16, dispatch: u16, snapshot: u16) -> (Vec<String>, Vec<String>, Vec<String>) {
    (
        vec![format!("tcp://127.0.0.1:{delivery}")],
        vec![format!("tcp://127.0.0.1:{dispatch}")],
        vec![format!("tcp://127.0.0.1:{snapshot}")],
    )
}

fn wait_online(worker: &Worker) {
    let e = worker.wait_for_event_matching(WAIT, |e| matches!(e.kind(), EvtType::Online | EvtType::Offline));
    assert_eq!(EvtType::Online, e.kind(), "expected worker to come online");
}

fn wait_for_kinds(worker: &Worker, expected: &[EvtType], timeout: Duration) -> Vec<EvtType> {
    let mut seen = Vec::new();
    for _ in 0..expected.len() {
        let e = worker.wait_for_event_matching(timeout, |e| expected.contains(&e.kind()));
        seen.push(e.kind());
    }
    seen
}

#[test]
fn s1_publish_then_receive() {
    let _ = env_logger::try_init();

    let (delivery, dispatch, snapshot) = endpoints(15701, 15702, 15703);
    let mut broker = Broker::new(Id::random());
    broker.set_endpoints(delivery.clone(), dispatch.clone(), snapshot.clone());

    let mut worker = Worker::new(Id::random());
    worker.set_topics_all();
    worker.set_endpoints(delivery, dispatch, snapshot);

    worker.start().unwrap();
    broker.start().unwrap();
    wait_online(&worker);

    worker.dispatch(Name::new("topicA").unwrap(), Part::from_str("Hello"), TopicKind::State).unwrap();

    let event = worker.wait_for_event_matching(WAIT, |e| e.kind() == EvtType::Delivery);
    assert_eq!(EvtType::Delivery, event.kind());
    assert_eq!(Notification::Success, event.notification());
    let topic = event.topic().expect("delivery event carries a topic");
    assert_eq!(broker.id(), topic.broker());
    assert_eq!(worker.id(), topic.worker());
    assert_eq!(1, topic.seq_num());
    assert_eq!("topicA", topic.name().as_str());
    assert_eq!(TopicKind::State, topic.kind());
    assert_eq!("Hello", topic.data().as_str().unwrap());

    worker.stop();
    broker.stop();
}

#[test]
fn s2_ten_count_producer_consumer() {
    let _ = env_logger::try_init();

    let (delivery, dispatch, snapshot) = endpoints(15711, 15712, 15713);
    let mut broker = Broker::new(Id::random());
    broker.set_endpoints(delivery.clone(), dispatch.clone(), snapshot.clone());

    let mut producer = Worker::new(Id::random());
    producer.set_topics_all();
    producer.set_endpoints(delivery.clone(), dispatch.clone(), snapshot.clone());

    let mut consumer = Worker::new(Id::random());
    consumer.set_topics_names(vec![Name::new("value").unwrap()]);
    consumer.set_endpoints(delivery, dispatch, snapshot);

    broker.start().unwrap();
    producer.start().unwrap();
    consumer.start().unwrap();
    wait_online(&producer);
    wait_online(&consumer);

    for i in 1..=10u8 {
        producer.dispatch(Name::new("value").unwrap(), Part::from_u8(i), TopicKind::State).unwrap();
    }

    let mut seen = Vec::new();
    while seen.len() < 10 {
        let event = consumer.wait_for_event_matching(WAIT, |e| e.kind() == EvtType::Delivery);
        let topic = event.topic().expect("delivery event carries a topic");
        seen.push(topic.seq_num());
    }

    assert_eq!((1..=10).collect::<Vec<_>>(), seen);

    producer.stop();
    consumer.stop();
    broker.stop();
}

#[test]
fn s3_snapshot_happy_path() {
    let _ = env_logger::try_init();

    let (delivery, dispatch, snapshot) = endpoints(15721, 15722, 15723);
    let mut broker = Broker::new(Id::random());
    broker.set_endpoints(delivery.clone(), dispatch.clone(), snapshot.clone());

    let mut producer = Worker::new(Id::random());
    producer.set_topics_all();
    producer.set_endpoints(delivery.clone(), dispatch.clone(), snapshot.clone());

    broker.start().unwrap();
    producer.start().unwrap();
    wait_online(&producer);

    producer.dispatch(Name::new("topicA").unwrap(), Part::from_str("Hello"), TopicKind::State).unwrap();
    let _ = producer.wait_for_event_matching(WAIT, |e| e.kind() == EvtType::Delivery);
    producer.dispatch(Name::new("topicB").unwrap(), Part::from_str("World"), TopicKind::State).unwrap();
    let _ = producer.wait_for_event_matching(WAIT, |e| e.kind() == EvtType::Delivery);

    let mut syncer = Worker::new(Id::random());
    syncer.set_topics_all();
    syncer.set_endpoints(delivery, dispatch, snapshot);
    syncer.start().unwrap();
    wait_online(&syncer);

    syncer.sync().unwrap();

    let expected = [
        EvtType::SyncDownloadOn,
        EvtType::SyncRequest,
        EvtType::SyncBegin,
        EvtType::SyncElement,
        EvtType::SyncElement,
        EvtType::SyncSuccess,
        EvtType::SyncDownloadOff,
    ];
    let seen = wait_for_kinds(&syncer, &expected, WAIT);
    assert_eq!(expected.to_vec(), seen);

    producer.stop();
    syncer.stop();
    broker.stop();
}

#[test]
fn s4_snapshot_failure() {
    let _ = env_logger::try_init();

    let (delivery, dispatch, snapshot) = endpoints(15731, 15732, 15733);

    let mut worker = Worker::new(Id::random());
    worker.set_topics_all();
    worker.set_endpoints(delivery, dispatch, snapshot);
    worker.start().unwrap();

    worker.sync().unwrap();

    let expected = [
        EvtType::SyncDownloadOn,
        EvtType::SyncRequest,
        EvtType::SyncRequest,
        EvtType::SyncError,
        EvtType::SyncDownloadOff,
    ];
    let seen = wait_for_kinds(&worker, &expected, Duration::from_secs(15));
    assert_eq!(expected.to_vec(), seen);

    worker.stop();
}

#[test]
fn s5_redundant_dispatch_degraded() {
    let _ = env_logger::try_init();

    let (delivery, _dispatch_unused, snapshot) = endpoints(15741, 0, 15743);
    let f1 = format!("tcp://127.0.0.1:{}", 15742);
    let f2 = format!("tcp://127.0.0.1:{}", 15744);

    // Worker has two dispatch bridges, f1 and f2; only f2 is bound by the
    // broker (f1 is "disabled"). The worker is configured with the same
    // (delivery, dispatch, snapshot) shape as the broker otherwise, just
    // with both bridges listed on its side.
    let mut broker = Broker::new(Id::random());
    broker.set_endpoints(delivery.clone(), vec![f2.clone()], snapshot.clone());

    let mut worker = Worker::new(Id::random());
    worker.set_topics_all();
    worker.set_endpoints(delivery, vec![f1, f2], snapshot);

    broker.start().unwrap();
    worker.start().unwrap();
    wait_online(&worker);

    worker.dispatch(Name::new("topicA").unwrap(), Part::from_str("Hello"), TopicKind::State).unwrap();
    let event = worker.wait_for_event_matching(WAIT, |e| e.kind() == EvtType::Delivery);
    assert_eq!(EvtType::Delivery, event.kind());

    worker.stop();
    broker.stop();
}

#[test]
fn s6_redundant_dispatch_total_failure() {
    let _ = env_logger::try_init();

    let (delivery, _dispatch_unused, snapshot) = endpoints(15751, 0, 15753);
    let f1 = format!("tcp://127.0.0.1:{}", 15752);
    let f2 = format!("tcp://127.0.0.1:{}", 15754);

    // Neither bridge is bound by any broker: the worker can never reach one.
    let mut worker = Worker::new(Id::random());
    worker.set_topics_all();
    worker.set_endpoints(delivery, vec![f1, f2], snapshot);
    worker.start().unwrap();

    let event = worker.wait_for_event_matching(Duration::from_secs(10), |e| e.kind() == EvtType::Delivery);
    assert_ne!(EvtType::Delivery, event.kind(), "no delivery should ever arrive");

    let offline = worker.wait_for_event_matching(Duration::from_secs(10), |e| e.kind() == EvtType::Offline);
    assert_eq!(EvtType::Offline, offline.kind());

    worker.stop();
}
