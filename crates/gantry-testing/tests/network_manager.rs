use std::{rc::Rc, time::Duration};

use gantry::Error;
use gantry_network::{DataHandler, NetworkManager, Socket};
use gantry_testing::{MockHandle, MockSocket};

const BUDGET: Duration = Duration::from_millis(50);

fn manager_with(socks: Vec<MockSocket>) -> NetworkManager {
    let mut nm = NetworkManager::new().unwrap();
    for sock in socks {
        nm.register_socket(Box::new(sock)).unwrap();
    }
    nm
}

#[test]
fn failing_activity_closes_and_frees_the_socket() {
    let (sock, mut handle) = MockSocket::pair().unwrap();
    handle.fail_next_activity(Error::Communication);
    let mut nm = manager_with(vec![sock]);

    handle.trigger();
    assert_eq!(nm.process(BUDGET), Err(Error::Communication));

    assert_eq!(handle.activity_calls(), 1);
    assert_eq!(handle.close_count(), 1);
    assert_eq!(handle.free_count(), 1);
    assert_eq!(nm.socket_count(), 0);
}

#[test]
fn deferred_deletion_still_drains_the_final_read() {
    let (sock, mut handle) = MockSocket::pair().unwrap();
    handle.queue_inbound(b"final frame");
    handle.flag_delete_after_activity();
    let mut nm = manager_with(vec![sock]);

    handle.trigger();
    nm.process(BUDGET).unwrap();

    // the frame was delivered before the socket went away
    assert_eq!(handle.delivered(), vec![b"final frame".to_vec()]);
    assert_eq!(handle.free_count(), 1);
    assert_eq!(nm.socket_count(), 0);
}

#[test]
fn flagged_quiescent_socket_is_reaped_without_activity() {
    let (sock, handle) = MockSocket::pair().unwrap();
    let mut nm = manager_with(vec![sock]);

    handle.set_may_delete();
    nm.process(Duration::from_millis(1)).unwrap();

    assert_eq!(handle.activity_calls(), 0);
    assert_eq!(handle.free_count(), 1);
    assert_eq!(nm.socket_count(), 0);
}

#[test]
fn discovery_urls_follow_registration_order() {
    let (first, _h1) = MockSocket::listener("opc.tcp://mill:4840/").unwrap();
    let (plain, _h2) = MockSocket::pair().unwrap();
    let (second, _h3) = MockSocket::listener("opc.tcp://press:4841/").unwrap();
    let nm = manager_with(vec![first, plain, second]);

    assert_eq!(nm.num_listener_sockets(), 2);
    assert_eq!(
        nm.discovery_urls().unwrap(),
        vec!["opc.tcp://mill:4840/".to_owned(), "opc.tcp://press:4841/".to_owned()]
    );
}

#[test]
fn shutdown_frees_every_socket_exactly_once() {
    let pairs: Vec<(MockSocket, MockHandle)> =
        (0..3).map(|_| MockSocket::pair().unwrap()).collect();
    let mut socks = Vec::new();
    let mut handles = Vec::new();
    for (sock, handle) in pairs {
        socks.push(sock);
        handles.push(handle);
    }
    let mut nm = manager_with(socks);

    nm.shutdown();

    assert_eq!(nm.socket_count(), 0);
    assert_eq!(nm.num_listener_sockets(), 0);
    for handle in &handles {
        assert_eq!(handle.close_count(), 1);
        assert_eq!(handle.free_count(), 1);
    }
}

#[test]
fn dropping_the_manager_frees_remaining_sockets() {
    let (sock, handle) = MockSocket::pair().unwrap();
    let nm = manager_with(vec![sock]);
    drop(nm);
    assert_eq!(handle.close_count(), 1);
    assert_eq!(handle.free_count(), 1);
}

#[test]
fn unregister_hands_the_socket_back_unclosed() {
    let (sock, handle) = MockSocket::pair().unwrap();
    let id = handle.id();
    let mut nm = manager_with(vec![sock]);

    let sock = nm.unregister_socket(id).expect("socket was registered");
    assert_eq!(nm.socket_count(), 0);
    assert_eq!(handle.close_count(), 0);
    assert_eq!(handle.free_count(), 0);
    assert!(nm.unregister_socket(id).is_none());

    drop(sock);
    assert_eq!(handle.free_count(), 1);
}

#[test]
fn send_buffer_lease_contract() {
    let (mut sock, handle) = MockSocket::pair().unwrap();

    // larger than the configured send window
    assert!(matches!(sock.acquire_send_buffer(1 << 20), Err(Error::Communication)));

    let mut buf = sock.acquire_send_buffer(4).unwrap();
    buf.copy_from_slice(&[1, 2, 3, 4]);
    sock.release_send_buffer(buf);
    assert!(handle.sent().is_empty());

    let mut buf = sock.acquire_send_buffer(4).unwrap();
    buf.copy_from_slice(&[5, 6, 7, 8]);
    sock.send(buf).unwrap();
    assert_eq!(handle.sent(), vec![vec![5, 6, 7, 8]]);
}

#[test]
fn queued_frames_reach_the_data_handler() {
    let replies: DataHandler = Rc::new(|sock, data| {
        let mut buf = sock.acquire_send_buffer(data.len())?;
        buf.copy_from_slice(data);
        sock.send(buf)
    });
    let (sock, mut handle) = MockSocket::with_handler(replies).unwrap();
    let mut nm = manager_with(vec![sock]);

    handle.queue_inbound(b"spindle speed");
    handle.trigger();
    nm.process(BUDGET).unwrap();

    assert_eq!(handle.sent(), vec![b"spindle speed".to_vec()]);
    assert_eq!(nm.socket_count(), 1);
}
