//! Session over real UDP sockets on loopback

use std::net::{Ipv4Addr, UdpSocket};
use std::thread;
use std::time::Duration;

use tracker_link::config::LinkConfig;
use tracker_link::protocol::{HANDSHAKE_REPLY_PREFIX, PacketType, ServerPacketType};
use tracker_link::sensor::{SensorSnapshot, SensorStatus};
use tracker_link::{MonotonicClock, Session, UdpTransport};

fn fake_server() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    socket
}

#[test]
fn handshake_and_sensor_info_over_udp() {
    let server = fake_server();
    let mut config = LinkConfig::default();
    config.server.address = Ipv4Addr::LOCALHOST;
    config.server.port = server.local_addr().unwrap().port();

    let transport = UdpTransport::bind("127.0.0.1:0").unwrap();
    let node_addr = transport.local_addr().unwrap();
    let mut session = Session::new(transport, MonotonicClock::new(), &config);
    let sensors = [SensorSnapshot {
        status: SensorStatus::Ok,
        ..SensorSnapshot::new(0)
    }];

    session.update(&sensors);
    let mut buf = [0u8; 512];
    let (len, from) = server.recv_from(&mut buf).unwrap();
    assert_eq!(from, node_addr);
    assert_eq!(buf[0], PacketType::Handshake.id());
    assert!(len > 9);

    let mut reply = vec![ServerPacketType::Handshake as u8];
    reply.extend_from_slice(HANDSHAKE_REPLY_PREFIX);
    server.send_to(&reply, node_addr).unwrap();

    for _ in 0..200 {
        session.update(&sensors);
        if session.is_connected() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert!(session.is_connected());
    assert_eq!(session.server_address(), server.local_addr().unwrap());

    // Feature request and sensor info follow the handshake
    let mut types = Vec::new();
    while types.len() < 2 {
        let (_, _) = server.recv_from(&mut buf).unwrap();
        if buf[0] != PacketType::Handshake.id() {
            types.push(buf[0]);
        }
    }
    assert_eq!(
        types,
        vec![PacketType::FeatureFlags.id(), PacketType::SensorInfo.id()]
    );
}
