//! Spec round-trip test 3: two concurrent connections with interleaved
//! requests each see only their own responses, in their own order.

mod common;

use std::thread;

use framed::NoEvents;

#[test]
fn two_connections_stay_independent() {
    common::spawn_server(common::EchoHandler, 18103, NoEvents);

    let mut a = common::connect(18103);
    let mut b = common::connect(18103);

    // Interleave writes across both connections before reading anything
    // back, so the server necessarily handles them concurrently.
    common::write_frame(&mut a, b"a-one").unwrap();
    common::write_frame(&mut b, b"b-one").unwrap();
    common::write_frame(&mut a, b"a-two").unwrap();
    common::write_frame(&mut b, b"b-two").unwrap();

    let handle_a = thread::spawn(move || {
        let first = common::read_frame(&mut a).unwrap();
        let second = common::read_frame(&mut a).unwrap();
        (first, second)
    });
    let handle_b = thread::spawn(move || {
        let first = common::read_frame(&mut b).unwrap();
        let second = common::read_frame(&mut b).unwrap();
        (first, second)
    });

    let (a_first, a_second) = handle_a.join().unwrap();
    let (b_first, b_second) = handle_b.join().unwrap();

    assert_eq!(a_first, b"a-one");
    assert_eq!(a_second, b"a-two");
    assert_eq!(b_first, b"b-one");
    assert_eq!(b_second, b"b-two");
}
