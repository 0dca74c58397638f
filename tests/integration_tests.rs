//! Integration tests for the tile-world server and client
//!
//! These tests run the real dispatch loop on an ephemeral port and talk to it
//! over TCP, either through the client library or with raw frames.

use client::network::{ClientSession, SharedPlayer};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use server::network::{Server, ServerConfig};
use server::registry::DuplicateOriginPolicy;
use shared::framing::{receive_frame, send_frame, FrameConfig};
use shared::generation::{NoiseGenerator, RandomColorGenerator, WorldGenerator};
use shared::protocol::decode_peers;
use shared::{PlayerState, World, WorldCodec};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(10);

struct RunningServer {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Server>,
}

impl RunningServer {
    async fn stop(self) -> Server {
        let _ = self.stop.send(());
        self.task.await.unwrap()
    }
}

fn test_world() -> World {
    NoiseGenerator::new(11).generate((4, 4), 8).unwrap()
}

async fn start_server(world: &World, policy: DuplicateOriginPolicy) -> RunningServer {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        duplicate_origin: policy,
        ..ServerConfig::default()
    };
    start_server_with(world, config).await
}

async fn start_server_with(world: &World, config: ServerConfig) -> RunningServer {
    let mut server = Server::bind(config, world, &WorldCodec::new()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (stop, stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        server
            .run_until(async {
                let _ = stop_rx.await;
            })
            .await
            .unwrap();
        server
    });

    RunningServer { addr, stop, task }
}

async fn join(addr: SocketAddr, name: &str, position: (f32, f32)) -> (ClientSession, SharedPlayer, World) {
    let player = SharedPlayer::new(PlayerState::new(name, position));
    let (session, world) = timeout(
        WAIT,
        ClientSession::connect(
            &addr.to_string(),
            player.clone(),
            &WorldCodec::new(),
            FrameConfig::default(),
        ),
    )
    .await
    .unwrap()
    .unwrap();
    (session, player, world)
}

/// WIRE FRAMING OVER REAL SOCKETS
mod framing_tests {
    use super::*;

    async fn tcp_roundtrip(payload: Vec<u8>) -> Vec<u8> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let sender = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            send_frame(&mut stream, &payload, &FrameConfig::default())
                .await
                .unwrap();
        });

        let (mut stream, _) = listener.accept().await.unwrap();
        let received = receive_frame(&mut stream, &FrameConfig::default())
            .await
            .unwrap()
            .unwrap();
        sender.await.unwrap();
        received
    }

    /// Random payloads around and far beyond the compression threshold
    #[tokio::test]
    async fn random_payload_sizes_roundtrip() {
        let mut rng = StdRng::seed_from_u64(5);

        for size in [0usize, 1023, 1_048_576, 1_048_577, 5_000_000] {
            let mut payload = vec![0u8; size];
            rng.fill_bytes(&mut payload);

            let received = timeout(WAIT, tcp_roundtrip(payload.clone())).await.unwrap();
            assert_eq!(received.len(), size);
            assert!(received == payload, "payload of {} bytes corrupted", size);
        }
    }

    /// Compresses far below the threshold, yet must still be inflated
    #[tokio::test]
    async fn highly_compressible_payload_roundtrip() {
        let payload = vec![7u8; 3_000_000];
        let received = timeout(WAIT, tcp_roundtrip(payload.clone())).await.unwrap();
        assert!(received == payload);
    }

    #[tokio::test]
    async fn several_frames_on_one_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = FrameConfig::default();

        let sender = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            for len in [10usize, 0, 2_000_000, 3] {
                send_frame(&mut stream, &vec![len as u8; len], &FrameConfig::default())
                    .await
                    .unwrap();
            }
        });

        let (mut stream, _) = listener.accept().await.unwrap();
        for len in [10usize, 0, 2_000_000, 3] {
            let frame = receive_frame(&mut stream, &config).await.unwrap().unwrap();
            assert_eq!(frame.len(), len);
        }
        sender.await.unwrap();
        assert!(receive_frame(&mut stream, &config).await.unwrap().is_none());
    }
}

/// SESSION SCENARIOS AGAINST THE DISPATCH LOOP
mod session_tests {
    use super::*;

    fn names(peers: &[PlayerState]) -> Vec<&str> {
        peers.iter().map(|p| p.name.as_str()).collect()
    }

    /// Every client receives the server's world, identical block for block
    #[tokio::test]
    async fn world_snapshot_on_connect() {
        let world = test_world();
        let server = start_server(&world, DuplicateOriginPolicy::Reject).await;

        let (_session, _player, received) = join(server.addr, "viewer", (0.0, 0.0)).await;
        assert_eq!(received, world);
        assert_eq!(received.block_count(), 4 * 4 * 8 * 8);

        server.stop().await;
    }

    #[tokio::test]
    async fn two_clients_see_each_other() {
        let world = test_world();
        let server = start_server(&world, DuplicateOriginPolicy::Reject).await;

        let (mut a, _a_player, _) = join(server.addr, "A", (1.0, 1.0)).await;
        let (mut b, b_player, _) = join(server.addr, "B", (0.0, 0.0)).await;

        let reply = a.sync_once().await.unwrap();
        assert!(!names(&reply).contains(&"A"));

        b_player.update(|p| p.position = (2.0, 2.0));
        let reply = b.sync_once().await.unwrap();
        assert_eq!(*reply, vec![PlayerState::new("A", (1.0, 1.0))]);

        let reply = a.sync_once().await.unwrap();
        assert_eq!(*reply, vec![PlayerState::new("B", (2.0, 2.0))]);

        let server = server.stop().await;
        assert_eq!(server.registry().len(), 2);
    }

    #[tokio::test]
    async fn disconnected_client_leaves_registry() {
        let world = test_world();
        let server = start_server(&world, DuplicateOriginPolicy::Reject).await;

        let (mut a, _, _) = join(server.addr, "A", (1.0, 1.0)).await;
        let (mut b, _, _) = join(server.addr, "B", (2.0, 2.0)).await;
        b.sync_once().await.unwrap();
        assert_eq!(names(&a.sync_once().await.unwrap()), vec!["B"]);

        drop(b);

        timeout(WAIT, async {
            loop {
                if a.sync_once().await.unwrap().is_empty() {
                    break;
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        let server = server.stop().await;
        assert!(server.registry().contains_name("A"));
        assert!(!server.registry().contains_name("B"));
    }

    #[tokio::test]
    async fn duplicate_name_is_refused() {
        let world = test_world();
        let server = start_server(&world, DuplicateOriginPolicy::Reject).await;

        let (mut first, _, _) = join(server.addr, "twin", (1.0, 1.0)).await;
        first.sync_once().await.unwrap();

        let (mut second, _, _) = join(server.addr, "twin", (2.0, 2.0)).await;
        let refused = timeout(WAIT, second.sync_once()).await.unwrap();
        assert!(refused.is_err());

        let reply = first.sync_once().await.unwrap();
        assert!(reply.is_empty());

        let server = server.stop().await;
        assert_eq!(server.registry().len(), 1);
        assert_eq!(
            server.registry().players().next().unwrap().position,
            (1.0, 1.0)
        );
    }

    /// A nameless handshake sent with raw frames closes only that connection
    #[tokio::test]
    async fn empty_name_closes_connection() {
        let world = test_world();
        let server = start_server(&world, DuplicateOriginPolicy::Reject).await;
        let config = FrameConfig::default();

        let (mut a, _, _) = join(server.addr, "A", (1.0, 1.0)).await;

        let mut raw = TcpStream::connect(server.addr).await.unwrap();
        receive_frame(&mut raw, &config).await.unwrap().unwrap();
        let nameless = bincode::serialize(&PlayerState::new("", (0.0, 0.0))).unwrap();
        send_frame(&mut raw, &nameless, &config).await.unwrap();

        let closed = timeout(WAIT, receive_frame(&mut raw, &config)).await.unwrap();
        assert!(matches!(closed, Ok(None)) || closed.is_err());

        assert!(a.sync_once().await.unwrap().is_empty());
        server.stop().await;
    }

    #[tokio::test]
    async fn garbage_frame_does_not_disturb_others() {
        let world = test_world();
        let server = start_server(&world, DuplicateOriginPolicy::Reject).await;
        let config = FrameConfig::default();

        let (mut a, _, _) = join(server.addr, "A", (1.0, 1.0)).await;
        let (mut b, _, _) = join(server.addr, "B", (2.0, 2.0)).await;
        b.sync_once().await.unwrap();

        let mut raw = TcpStream::connect(server.addr).await.unwrap();
        receive_frame(&mut raw, &config).await.unwrap().unwrap();
        send_frame(&mut raw, &[0xde, 0xad], &config).await.unwrap();
        let _ = timeout(WAIT, receive_frame(&mut raw, &config)).await.unwrap();

        let reply = a.sync_once().await.unwrap();
        assert_eq!(*reply, vec![PlayerState::new("B", (2.0, 2.0))]);
        server.stop().await;
    }

    /// A client announcing a frame above the inbound limit loses only its own connection
    #[tokio::test]
    async fn oversized_client_frame_closes_only_that_connection() {
        let world = test_world();
        let server = start_server(&world, DuplicateOriginPolicy::Reject).await;
        let config = FrameConfig::default();

        let (mut a, _, _) = join(server.addr, "A", (1.0, 1.0)).await;
        a.sync_once().await.unwrap();

        let mut raw = TcpStream::connect(server.addr).await.unwrap();
        receive_frame(&mut raw, &config).await.unwrap().unwrap();
        let big = PlayerState::new("x".repeat(100 * 1024), (0.0, 0.0));
        let big = bincode::serialize(&big).unwrap();
        // The server may close before the body is fully written
        let _ = send_frame(&mut raw, &big, &config).await;

        let closed = timeout(WAIT, receive_frame(&mut raw, &config)).await.unwrap();
        assert!(matches!(closed, Ok(None)) || closed.is_err());

        assert!(a.sync_once().await.unwrap().is_empty());
        let server = server.stop().await;
        assert_eq!(server.registry().len(), 1);
    }

    /// While the loop is stuck writing a snapshot to a client that never reads,
    /// other clients are pushed back instead of being buffered without limit
    #[tokio::test]
    async fn stalled_loop_applies_backpressure() {
        // Tens of megabytes uncompressed, more than the socket buffers hold
        let world = RandomColorGenerator { seed: 8 }.generate((32, 32), 32).unwrap();
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            outbound: FrameConfig {
                compression_threshold: usize::MAX,
                ..FrameConfig::default()
            },
            ..ServerConfig::default()
        };
        let server = start_server_with(&world, config).await;
        let frames = FrameConfig::default();

        let mut busy = TcpStream::connect(server.addr).await.unwrap();
        timeout(WAIT, receive_frame(&mut busy, &frames))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let update = bincode::serialize(&PlayerState::new("y".repeat(16 * 1024), (0.0, 0.0))).unwrap();
        send_frame(&mut busy, &update, &frames).await.unwrap();

        // Never reads, so the snapshot write blocks the loop
        let stuck = TcpStream::connect(server.addr).await.unwrap();
        sleep(Duration::from_millis(200)).await;

        let flood = async {
            for _ in 0..4096 {
                send_frame(&mut busy, &update, &frames).await.unwrap();
            }
        };
        assert!(
            timeout(Duration::from_secs(3), flood).await.is_err(),
            "server absorbed 64 MiB while its loop was stalled"
        );

        drop(stuck);
        let _ = busy.shutdown().await;
        drop(busy);

        // The loop recovers and serves a newcomer end to end
        let mut late = TcpStream::connect(server.addr).await.unwrap();
        timeout(WAIT, receive_frame(&mut late, &frames))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let me = bincode::serialize(&PlayerState::new("late", (1.0, 1.0))).unwrap();
        send_frame(&mut late, &me, &frames).await.unwrap();
        send_frame(&mut late, &me, &frames).await.unwrap();
        let reply = timeout(WAIT, receive_frame(&mut late, &frames))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(decode_peers(&reply).is_ok());

        let server = server.stop().await;
        assert!(server.registry().contains_name("late"));
    }

    /// Peers reported in a reply are decodable with the plain protocol helpers
    #[tokio::test]
    async fn raw_client_receives_peer_list() {
        let world = test_world();
        let server = start_server(&world, DuplicateOriginPolicy::Reject).await;
        let config = FrameConfig::default();

        let (mut a, _, _) = join(server.addr, "A", (4.0, 4.0)).await;
        a.sync_once().await.unwrap();

        let mut raw = TcpStream::connect(server.addr).await.unwrap();
        receive_frame(&mut raw, &config).await.unwrap().unwrap();
        let me = bincode::serialize(&PlayerState::new("raw", (0.0, 0.0))).unwrap();
        send_frame(&mut raw, &me, &config).await.unwrap();
        send_frame(&mut raw, &me, &config).await.unwrap();

        let reply = timeout(WAIT, receive_frame(&mut raw, &config))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(decode_peers(&reply).unwrap(), vec![PlayerState::new("A", (4.0, 4.0))]);

        server.stop().await;
    }
}
