//! End-to-end scenarios against a live server on an ephemeral port.
//!
//! One server instance is shared by every test in this file; each test
//! opens its own client connection(s) and works inside its own tempdir.
//! The tests run serially: the server lives in this process, so native
//! descriptor numbers are recycled across tests, and a bad-handle scenario
//! in one test must not race another test's freshly opened handle.

use std::io::Write as _;
use std::net::TcpStream;
use std::sync::OnceLock;

use serial_test::serial;

use telefs::client::{file_ops::FileClient, stub};
use telefs::config::{ClientConfig, ServerConfig};
use telefs::server::Server;

static SERVER_PORT: OnceLock<u16> = OnceLock::new();

fn server_port() -> u16 {
    *SERVER_PORT.get_or_init(|| {
        let config = ServerConfig {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        };
        let server = Server::bind(&config).expect("bind test server");
        let port = server.local_addr().expect("server addr").port();
        std::thread::spawn(move || {
            let _ = server.run();
        });
        port
    })
}

fn client_config() -> ClientConfig {
    ClientConfig {
        port: server_port(),
        ..ClientConfig::default()
    }
}

fn connect() -> FileClient {
    FileClient::connect(&client_config()).expect("connect to test server")
}

fn last_errno() -> Option<i32> {
    std::io::Error::last_os_error().raw_os_error()
}

#[test]
#[serial]
fn test_open_read_seek_close_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, b"hello\r\n").unwrap();
    let path = path.to_str().unwrap();

    let mut fc = connect();

    let fd = fc.open(path, libc::O_RDONLY, 0);
    assert!(fd >= 12345, "remote handle must sit in the remote band");

    let mut buf = [0u8; 5];
    assert_eq!(fc.read(fd, &mut buf), 5);
    assert_eq!(&buf, b"hello");

    let mut rest = [0u8; 100];
    assert_eq!(fc.read(fd, &mut rest), 2);
    assert_eq!(&rest[..2], b"\r\n");

    assert_eq!(fc.lseek(fd, 0, libc::SEEK_SET), 0);
    assert_eq!(fc.read(fd, &mut buf), 5);
    assert_eq!(&buf, b"hello");

    assert_eq!(fc.close(fd), 0);

    assert_eq!(fc.close(fd), -1);
    assert_eq!(last_errno(), Some(libc::EBADF));
}

#[test]
#[serial]
fn test_open_missing_file_sets_enoent() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");

    let mut fc = connect();
    let fd = fc.open(missing.to_str().unwrap(), libc::O_RDONLY, 0);
    assert_eq!(fd, -1);
    assert_eq!(last_errno(), Some(libc::ENOENT));
}

#[test]
#[serial]
fn test_create_write_then_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("written.txt");
    let path = path.to_str().unwrap();

    let mut fc = connect();

    let fd = fc.open(path, libc::O_CREAT | libc::O_WRONLY, 0o644);
    assert!(fd >= 12345);
    assert_eq!(fc.write(fd, b"remote bytes"), 12);
    assert_eq!(fc.close(fd), 0);

    // The server really wrote through to the filesystem.
    assert_eq!(std::fs::read(path).unwrap(), b"remote bytes");

    let fd = fc.open(path, libc::O_RDONLY, 0);
    let mut buf = [0u8; 64];
    assert_eq!(fc.read(fd, &mut buf), 12);
    assert_eq!(&buf[..12], b"remote bytes");
    assert_eq!(fc.close(fd), 0);
}

#[test]
#[serial]
fn test_lseek_positions_and_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seek.txt");
    std::fs::write(&path, b"0123456789").unwrap();
    let path = path.to_str().unwrap();

    let mut fc = connect();
    let fd = fc.open(path, libc::O_RDONLY, 0);

    assert_eq!(fc.lseek(fd, 0, libc::SEEK_END), 10);
    assert_eq!(fc.lseek(fd, 3, libc::SEEK_SET), 3);
    let mut buf = [0u8; 4];
    assert_eq!(fc.read(fd, &mut buf), 4);
    assert_eq!(&buf, b"3456");

    assert_eq!(fc.lseek(fd, -1, libc::SEEK_SET), -1);
    assert_eq!(last_errno(), Some(libc::EINVAL));

    fc.close(fd);
}

#[test]
#[serial]
fn test_stat_reports_remote_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stat.me");
    std::fs::write(&path, b"seven b").unwrap();
    let path = path.to_str().unwrap();

    let mut fc = connect();
    let mut statbuf: libc::stat = unsafe { std::mem::zeroed() };
    assert_eq!(fc.stat(path, &mut statbuf), 0);
    assert_eq!(statbuf.st_size, 7);
    assert_eq!(statbuf.st_mode & libc::S_IFMT, libc::S_IFREG);

    let missing = dir.path().join("gone");
    assert_eq!(fc.stat(missing.to_str().unwrap(), &mut statbuf), -1);
    assert_eq!(last_errno(), Some(libc::ENOENT));
}

#[test]
#[serial]
fn test_unlink_removes_and_reports() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("victim");
    std::fs::write(&path, b"x").unwrap();

    let mut fc = connect();
    assert_eq!(fc.unlink(path.to_str().unwrap()), 0);
    assert!(!path.exists());

    assert_eq!(fc.unlink(path.to_str().unwrap()), -1);
    assert_eq!(last_errno(), Some(libc::ENOENT));
}

#[test]
#[serial]
fn test_getdirentries_lists_remote_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("first.txt"), b"1").unwrap();
    std::fs::write(dir.path().join("second.txt"), b"2").unwrap();

    let mut fc = connect();
    let fd = fc.open(
        dir.path().to_str().unwrap(),
        libc::O_RDONLY | libc::O_DIRECTORY,
        0,
    );
    assert!(fd >= 12345);

    let mut entries = Vec::new();
    let mut basep: i64 = 0;
    loop {
        let mut buf = [0u8; 4096];
        let n = fc.getdirentries(fd, &mut buf, &mut basep);
        assert!(n >= 0);
        if n == 0 {
            break;
        }
        entries.extend_from_slice(&buf[..n as usize]);
    }
    fc.close(fd);

    // The blob is raw platform dirents; the names must appear within it.
    let haystack = |needle: &[u8]| {
        entries
            .windows(needle.len())
            .any(|w| w == needle)
    };
    assert!(haystack(b"first.txt"));
    assert!(haystack(b"second.txt"));
}

#[test]
#[serial]
fn test_getdirtree_returns_remote_subtree() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"hello\r\n").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub").join("x"), b"").unwrap();

    let mut fc = connect();
    let tree = fc.getdirtree(dir.path().to_str().unwrap()).unwrap();

    assert_eq!(
        tree.name,
        dir.path().file_name().unwrap().to_string_lossy()
    );
    assert_eq!(tree.children.len(), 2);

    let a = tree.children.iter().find(|c| c.name == "a.txt").unwrap();
    assert!(a.children.is_empty());
    let sub = tree.children.iter().find(|c| c.name == "sub").unwrap();
    assert_eq!(sub.children.len(), 1);
    assert_eq!(sub.children[0].name, "x");

    FileClient::freedirtree(tree);

    let missing = dir.path().join("absent");
    assert!(fc.getdirtree(missing.to_str().unwrap()).is_none());
    assert_eq!(last_errno(), Some(libc::ENOENT));
}

#[test]
#[serial]
fn test_local_handles_never_touch_the_network() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("local.txt");
    std::fs::write(&path, b"local data").unwrap();

    // A handle from the ordinary local open sits below the remote band and
    // must be served by the real local calls even with a live session.
    let mut fc = connect();
    let cpath = std::ffi::CString::new(path.to_str().unwrap()).unwrap();
    let local_fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDONLY) };
    assert!(local_fd >= 0 && (local_fd as i64) < 12345);

    let mut buf = [0u8; 10];
    assert_eq!(fc.read(local_fd, &mut buf), 10);
    assert_eq!(&buf, b"local data");
    assert_eq!(fc.lseek(local_fd, 0, libc::SEEK_SET), 0);
    assert_eq!(fc.close(local_fd), 0);
}

#[test]
#[serial]
fn test_pipelined_sessions_do_not_cross_talk() {
    let dir = tempfile::tempdir().unwrap();
    let make_file = |name: &str, fill: u8| {
        let path = dir.path().join(name);
        std::fs::write(&path, vec![fill; 512]).unwrap();
        path.to_str().unwrap().to_string()
    };
    let path_a = make_file("client_a.bin", b'A');
    let path_b = make_file("client_b.bin", b'B');

    let worker = |path: String, fill: u8| {
        std::thread::spawn(move || {
            let mut fc = connect();
            for _ in 0..200 {
                let fd = fc.open(&path, libc::O_RDONLY, 0);
                assert!(fd >= 12345);
                let mut buf = [0u8; 512];
                assert_eq!(fc.read(fd, &mut buf), 512);
                assert!(buf.iter().all(|&b| b == fill), "cross-talk detected");
                assert_eq!(fc.close(fd), 0);
            }
        })
    };

    let a = worker(path_a, b'A');
    let b = worker(path_b, b'B');
    a.join().unwrap();
    b.join().unwrap();
}

#[test]
#[serial]
fn test_dropped_client_does_not_poison_the_server() {
    // Abandon a connection mid-frame; its worker terminates alone.
    {
        let mut rogue =
            TcpStream::connect(("127.0.0.1", server_port())).expect("connect rogue client");
        rogue
            .write_all(b"Message-Length:100000\r\n\r\nonly a fragment")
            .unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alive.txt");
    std::fs::write(&path, b"still serving").unwrap();

    let mut fc = connect();
    let fd = fc.open(path.to_str().unwrap(), libc::O_RDONLY, 0);
    assert!(fd >= 12345);
    let mut buf = [0u8; 32];
    assert_eq!(fc.read(fd, &mut buf), 13);
    assert_eq!(&buf[..13], b"still serving");
    assert_eq!(fc.close(fd), 0);
}

#[test]
#[serial]
fn test_global_stub_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stubbed.txt");
    std::fs::write(&path, b"via the singleton").unwrap();
    let path = path.to_str().unwrap();

    stub::init_with_config(&client_config()).expect("stub init");

    let fd = stub::open(path, libc::O_RDONLY, 0);
    assert!(fd >= 12345);
    let mut buf = [0u8; 64];
    assert_eq!(stub::read(fd, &mut buf), 17);
    assert_eq!(&buf[..17], b"via the singleton");
    assert_eq!(stub::close(fd), 0);

    if let Some(tree) = stub::getdirtree(dir.path().to_str().unwrap()) {
        stub::freedirtree(tree);
    } else {
        panic!("stub getdirtree failed");
    }

    stub::teardown();
}
