use axum::Router;
use axum::extract::{Multipart, State};
use axum::routing::post;
use fsmirror::dir_watcher::{self, DirWatcher};
use fsmirror::models::config::{Profile, SyncContext};
use fsmirror::models::upload::UploadRequest;
use fsmirror::uploader::{self, HttpPoster};
use fsmirror::walker;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

/// One multipart request as seen by the receiver: (field name, filename, bytes).
type Received = Vec<(String, Option<String>, Vec<u8>)>;

async fn upload(State(tx): State<mpsc::Sender<Received>>, mut multipart: Multipart) {
    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.unwrap().to_vec();
        fields.push((name, file_name, data));
    }
    tx.send(fields).unwrap();
}

/// Starts a receiver on its own runtime thread and returns its `/up` URL.
fn spawn_receiver() -> (String, mpsc::Receiver<Received>) {
    let (tx, rx) = mpsc::channel();
    let (addr_tx, addr_rx) = mpsc::channel::<SocketAddr>();

    thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            addr_tx.send(listener.local_addr().unwrap()).unwrap();

            let app = Router::new().route("/up", post(upload)).with_state(tx);
            axum::serve(listener, app).await.unwrap();
        });
    });

    let addr = addr_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    (format!("http://{}/up", addr), rx)
}

fn context(receiver: &str, base: PathBuf) -> SyncContext {
    SyncContext {
        profile: Profile {
            receiver: receiver.to_string(),
            root: "/remote/".to_string(),
            source_path: base.clone(),
        },
        base_path: base,
    }
}

#[test]
fn test_post_sends_destination_then_file() {
    let (url, rx) = spawn_receiver();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "hi").unwrap();

    let ctx = context(&url, dir.path().to_path_buf());
    let poster = HttpPoster::new(url.clone());
    let outcome = uploader::sync_file(&ctx, &dir.path().join("a.txt"), |req| poster.post(req)).unwrap();
    assert!(outcome.is_uploaded());

    let fields = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(fields.len(), 2);

    let (name, file_name, data) = &fields[0];
    assert_eq!(name, "to");
    assert!(file_name.is_none());
    assert_eq!(data, b"/remote/a.txt");

    let (name, file_name, data) = &fields[1];
    assert_eq!(name, "file");
    assert_eq!(file_name.as_deref(), Some("a.txt"));
    assert_eq!(data, b"hi");
}

#[test]
fn test_initial_sync_mirrors_tree_over_http() {
    let (url, rx) = spawn_receiver();
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("sub/dir")).unwrap();
    fs::create_dir_all(dir.path().join(".git")).unwrap();
    fs::write(dir.path().join("sub/dir/file.txt"), "nested").unwrap();
    fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();
    fs::write(dir.path().join(".env"), "secret").unwrap();

    let ctx = context(&url, dir.path().to_path_buf());
    let poster = HttpPoster::new(url.clone());
    let summary = walker::initial_sync(&ctx, dir.path(), |req: &UploadRequest| poster.post(req)).unwrap();
    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.failed, 0);

    let fields = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(fields[0].2, b"/remote/sub/dir/file.txt");
    assert_eq!(fields[1].2, b"nested");
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_unreachable_receiver_is_a_transport_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.txt");
    fs::write(&file, "hi").unwrap();

    let request = UploadRequest {
        local_path: file,
        relative_path: "a.txt".to_string(),
        destination: "/remote/a.txt".to_string(),
    };
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let url = format!("http://127.0.0.1:{}/up", port);
    assert!(HttpPoster::new(url).post(&request).is_err());
}

#[test]
fn test_file_reporting_zero_length_is_sent_whole() {
    let (url, rx) = spawn_receiver();

    // procfs reports a size of 0 but yields content when read
    let request = UploadRequest {
        local_path: PathBuf::from("/proc/self/status"),
        relative_path: "status".to_string(),
        destination: "/remote/status".to_string(),
    };
    assert_eq!(fs::metadata(&request.local_path).unwrap().len(), 0);

    HttpPoster::new(url).post(&request).unwrap();

    let fields = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].2, b"/remote/status");
    assert_eq!(fields[1].0, "file");
    assert!(String::from_utf8_lossy(&fields[1].2).contains("Name:"));
}

#[test]
fn test_event_loop_uploads_file_created_after_startup() {
    let (url, rx) = spawn_receiver();
    let dir = tempfile::tempdir().unwrap();
    let ctx = Arc::new(context(&url, dir.path().to_path_buf()));

    let mut watcher = DirWatcher::new().unwrap();
    walker::register_tree(&ctx.base_path, |p| watcher.add(p)).unwrap();
    let poster = HttpPoster::new(url.clone());
    let summary = walker::initial_sync(&ctx, &ctx.base_path, |req| poster.post(req)).unwrap();
    assert_eq!(summary.uploaded, 0);

    dir_watcher::spawn_event_loop(watcher, Arc::clone(&ctx), move |req| poster.post(req)).unwrap();

    fs::write(dir.path().join("a.txt"), "hi").unwrap();

    // create and modify each trigger an upload; wait for one carrying the content
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut uploads = Vec::new();
    while !uploads.iter().any(|fields: &Received| fields[1].2 == b"hi") {
        let remaining = deadline.saturating_duration_since(Instant::now());
        uploads.push(rx.recv_timeout(remaining).expect("no upload with the file content"));
    }

    for fields in &uploads {
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "to");
        assert_eq!(fields[0].2, b"/remote/a.txt");
        assert_eq!(fields[1].1.as_deref(), Some("a.txt"));
    }
}
