//! Spec round-trip test 2 (+4): four bodies of sizes 1024, 1, 65535, and
//! 300000 sent back to back on one connection come back in the same order
//! with matching sizes and contents. 300000 also exercises the receive
//! buffer's doubling-growth path past its 1024-byte initial reserve.

mod common;

use framed::NoEvents;

#[test]
fn four_frames_round_trip_in_order() {
    common::spawn_server(common::EchoHandler, 18102, NoEvents);

    let mut stream = common::connect(18102);
    let bodies: Vec<Vec<u8>> =
        [1024usize, 1, 65535, 300_000].iter().map(|&len| vec![0xABu8; len]).collect();

    for body in &bodies {
        common::write_frame(&mut stream, body).unwrap();
    }

    for expected in &bodies {
        let got = common::read_frame(&mut stream).unwrap();
        assert_eq!(got.len(), expected.len());
        assert_eq!(&got, expected);
    }
}
