use std::io::Read as _;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use pagewatch::notification::{ChangeNotification, Notifier, SendGridNotifier};

#[derive(Debug)]
struct Captured {
    method: String,
    path: String,
    authorization: Option<String>,
    body: serde_json::Value,
}

fn spawn_sendgrid_stub(
    status: u16,
) -> (
    String,
    mpsc::Receiver<Captured>,
    mpsc::Sender<()>,
    thread::JoinHandle<()>,
) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let addr = server.server_addr();
    let base_url = format!("http://{addr}");

    let (captured_tx, captured_rx) = mpsc::channel::<Captured>();
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let mut raw = String::new();
            let _ = request.as_reader().read_to_string(&mut raw);
            let authorization = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Authorization"))
                .map(|h| h.value.as_str().to_owned());
            let _ = captured_tx.send(Captured {
                method: request.method().as_str().to_owned(),
                path: request.url().to_owned(),
                authorization,
                body: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
            });

            let _ = request.respond(
                tiny_http::Response::from_string(if status < 300 { "" } else { "denied" })
                    .with_status_code(status),
            );
        }
    });

    (base_url, captured_rx, shutdown_tx, handle)
}

fn notification() -> ChangeNotification {
    ChangeNotification {
        monitored_url: "https://news.example/world/".to_owned(),
        subject_link: "https://news.example/world/storm-hits-coast".to_owned(),
        previous_link: None,
        diff_text: "++ Added:\n+ Storm hits coast".to_owned(),
    }
}

#[tokio::test]
async fn posts_one_message_per_recipient() -> anyhow::Result<()> {
    let (base_url, captured, shutdown_tx, handle) = spawn_sendgrid_stub(202);
    let notifier = SendGridNotifier::new(
        &format!("{base_url}/"),
        "SG.test-key".to_owned(),
        "monitor@example.com".to_owned(),
        vec!["a@example.com".to_owned(), "b@example.com".to_owned()],
        Duration::from_secs(5),
    )?;

    notifier.deliver(&notification()).await?;

    let first = captured.recv_timeout(Duration::from_secs(5))?;
    let second = captured.recv_timeout(Duration::from_secs(5))?;
    assert_eq!(first.method, "POST");
    assert_eq!(first.path, "/v3/mail/send");
    assert_eq!(first.authorization.as_deref(), Some("Bearer SG.test-key"));
    assert_eq!(
        first.body["personalizations"][0]["to"][0]["email"],
        "a@example.com"
    );
    assert_eq!(
        second.body["personalizations"][0]["to"][0]["email"],
        "b@example.com"
    );
    assert_eq!(first.body["from"]["email"], "monitor@example.com");
    assert_eq!(
        first.body["subject"],
        "[pagewatch] Change detected: https://news.example/world/storm-hits-coast"
    );
    assert_eq!(first.body["content"][0]["type"], "text/plain");
    assert!(
        first.body["content"][0]["value"]
            .as_str()
            .unwrap_or_default()
            .contains("+ Storm hits coast")
    );
    assert_eq!(
        first.body["tracking_settings"]["click_tracking"]["enable"],
        false
    );

    let _ = shutdown_tx.send(());
    let _ = handle.join();
    Ok(())
}

#[tokio::test]
async fn rejected_send_is_an_error() -> anyhow::Result<()> {
    let (base_url, captured, shutdown_tx, handle) = spawn_sendgrid_stub(401);
    let notifier = SendGridNotifier::new(
        &base_url,
        "SG.bad-key".to_owned(),
        "monitor@example.com".to_owned(),
        vec!["a@example.com".to_owned()],
        Duration::from_secs(5),
    )?;

    let err = notifier.deliver_test().await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("401"), "{message}");
    assert!(message.contains("a@example.com"), "{message}");

    let request = captured.recv_timeout(Duration::from_secs(5))?;
    assert_eq!(request.body["subject"], "[pagewatch] Test notification");

    let _ = shutdown_tx.send(());
    let _ = handle.join();
    Ok(())
}
