use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use amplink_rpc::{
    //
    create_memory_transport,
    ConnectionHooks,
    DispatchFault,
    ErrorSink,
    MemoryPeer,
    Reply,
    Result,
    RpcClient,
    RpcError,
    SeqId,
};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct SetLed {
    brightness: u8,
}

#[derive(Debug, Deserialize, PartialEq)]
struct LedState {
    brightness: u8,
    on: bool,
}

async fn connected() -> Result<(RpcClient, MemoryPeer)> {
    // ---
    init_logging();
    let (transport, peer) = create_memory_transport();
    let client = RpcClient::builder(transport).build().await?;
    Ok((client, peer))
}

/// Peer that answers every command with `{"echo": method, "seq": id}`.
fn spawn_echo_peer(rt: &tokio::runtime::Runtime, mut peer: MemoryPeer) {
    rt.spawn(async move {
        while let Some(cmd) = peer.next_command().await {
            let value = json!({"echo": cmd.method, "seq": cmd.seq_id.get()});
            if peer.reply(&cmd, &value).is_err() {
                break;
            }
        }
    });
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime")
}

#[tokio::test]
async fn test_structured_reply_for_first_command() -> Result<()> {
    // ---
    let (client, mut peer) = connected().await?;

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.call_value("x", "y", &json!({})).await });

    let cmd = peer.next_command().await.expect("command");
    assert_eq!(cmd.seq_id, SeqId::new(1));
    assert_eq!(cmd.iface, "x");
    assert_eq!(cmd.method, "y");

    peer.send_frame(
        r#"{"type":"response","seqId":1,"iface":"x","method":"y","payload":{"value":{"ok":true},"alt":"gaJva8M="}}"#,
    )?;

    let value = call.await.expect("call task panicked")?;
    assert_eq!(value, json!({"ok": true}));
    assert_eq!(client.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_stray_reply_is_dropped_and_client_stays_usable() -> Result<()> {
    // ---
    let (client, mut peer) = connected().await?;

    peer.send_frame(r#"{"type":"response","seqId":42,"iface":"a","method":"b","payload":{"value":1,"alt":""}}"#)?;
    peer.send_frame("this is not an envelope")?;

    let caller = client.clone();
    let call = tokio::spawn(async move { caller.call_value("a", "b", &json!(null)).await });

    let cmd = peer.next_command().await.expect("command");
    peer.reply(&cmd, &json!("fine"))?;

    assert_eq!(call.await.expect("call task panicked")?, json!("fine"));
    Ok(())
}

#[tokio::test]
async fn test_out_of_order_replies_reach_their_own_callers() -> Result<()> {
    // ---
    let (client, mut peer) = connected().await?;

    // Burn ids 1..=4 so the two callers get 5 and 6.
    for _ in 0..4 {
        client.send_command("warm", "up", &json!({}), |_r: Reply| -> Result<()> { Ok(()) })?;
        let cmd = peer.next_command().await.expect("command");
        peer.reply(&cmd, &json!({}))?;
    }

    let first = client.clone();
    let a = tokio::spawn(async move { first.call_value("Caller", "a", &json!({})).await });
    let cmd_a = peer.next_command().await.expect("command a");

    let second = client.clone();
    let b = tokio::spawn(async move { second.call_value("Caller", "b", &json!({})).await });
    let cmd_b = peer.next_command().await.expect("command b");

    assert_eq!(cmd_a.seq_id, SeqId::new(5));
    assert_eq!(cmd_b.seq_id, SeqId::new(6));

    peer.reply(&cmd_b, &json!({"for": "b"}))?;
    peer.reply(&cmd_a, &json!({"for": "a"}))?;

    assert_eq!(a.await.expect("a panicked")?, json!({"for": "a"}));
    assert_eq!(b.await.expect("b panicked")?, json!({"for": "b"}));
    Ok(())
}

#[tokio::test]
async fn test_typed_call_and_alt_encoding() -> Result<()> {
    // ---
    let (client, mut peer) = connected().await?;

    let caller = client.clone();
    let typed = tokio::spawn(async move {
        caller
            .call_as::<_, LedState>("Led", "set", &SetLed { brightness: 80 })
            .await
    });

    let cmd = peer.next_command().await.expect("command");
    let sent: SetLed = cmd.payload.value_as()?;
    assert_eq!(sent, SetLed { brightness: 80 });
    let sent_alt: SetLed = cmd.payload.decode_alt()?;
    assert_eq!(sent_alt, sent);

    peer.reply(&cmd, &json!({"brightness": 80, "on": true}))?;
    assert_eq!(
        typed.await.expect("typed panicked")?,
        LedState {
            brightness: 80,
            on: true
        }
    );

    let caller = client.clone();
    let alt = tokio::spawn(async move { caller.call_alt("Led", "get", &json!({})).await });
    let cmd = peer.next_command().await.expect("command");
    peer.reply(&cmd, &json!({"brightness": 10, "on": false}))?;

    let alt = alt.await.expect("alt panicked")?;
    let decoded: Value = amplink_rpc::codec::decode_alt(&alt)?;
    assert_eq!(decoded, json!({"brightness": 10, "on": false}));
    Ok(())
}

#[tokio::test]
async fn test_failing_responder_is_contained() -> Result<()> {
    // ---
    #[derive(Clone, Default)]
    struct Faults(Arc<Mutex<Vec<u64>>>);

    impl ErrorSink for Faults {
        fn report(&self, fault: DispatchFault<'_>) {
            if let DispatchFault::ResponderFailed { seq_id, .. } = fault {
                self.0.lock().unwrap().push(seq_id.get());
            }
        }
    }

    init_logging();
    let faults = Faults::default();
    let (transport, mut peer) = create_memory_transport();
    let client = RpcClient::builder(transport)
        .error_sink(faults.clone())
        .build()
        .await?;

    let bad = client.send_command("Bad", "cmd", &json!({}), |_r: Reply| -> Result<()> {
        Err(RpcError::Responder("cannot handle".into()))
    })?;

    let caller = client.clone();
    let good = tokio::spawn(async move { caller.call_value("Good", "cmd", &json!({})).await });

    let bad_cmd = peer.next_command().await.expect("bad");
    let good_cmd = peer.next_command().await.expect("good");
    peer.reply(&bad_cmd, &json!(1))?;
    peer.reply(&good_cmd, &json!(2))?;

    assert_eq!(good.await.expect("good panicked")?, json!(2));
    assert_eq!(*faults.0.lock().unwrap(), vec![bad.get()]);
    Ok(())
}

#[tokio::test]
async fn test_call_with_timeout_unregisters() -> Result<()> {
    // ---
    let (client, mut peer) = connected().await?;

    let result = client
        .call_with_timeout("Slow", "op", &json!({}), Duration::from_millis(50))
        .await;
    assert!(matches!(result, Err(RpcError::Timeout)));
    assert_eq!(client.pending_count(), 0);

    // The late reply is unmatched and harmless.
    let cmd = peer.next_command().await.expect("command");
    peer.reply(&cmd, &json!("late"))?;

    let caller = client.clone();
    let next = tokio::spawn(async move { caller.call_value("Fast", "op", &json!({})).await });
    let cmd = peer.next_command().await.expect("command");
    peer.reply(&cmd, &json!("ok"))?;
    assert_eq!(next.await.expect("next panicked")?, json!("ok"));
    Ok(())
}

#[tokio::test]
async fn test_send_after_peer_gone_is_closed() -> Result<()> {
    // ---
    let (client, peer) = connected().await?;
    drop(peer);

    let result = client.call("Any", "op", &json!({})).await;
    assert!(matches!(result, Err(RpcError::ConnectionClosed)));
    assert_eq!(client.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_blocking_call_inside_current_thread_runtime_is_refused_before_sending() -> Result<()> {
    // ---
    let (client, mut peer) = connected().await?;

    let result = client.send_command_value_sync("Any", "op", &json!({}));
    assert!(matches!(result, Err(RpcError::BlockingInAsyncContext)));
    assert_eq!(client.pending_count(), 0);

    drop(client);
    assert!(peer.next_command().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_hooks_observe_lifecycle() -> Result<()> {
    // ---
    #[derive(Clone, Default)]
    struct Events(Arc<Mutex<Vec<String>>>);

    impl ConnectionHooks for Events {
        fn on_open(&self) {
            self.0.lock().unwrap().push("open".into());
        }

        fn on_close(&self, code: Option<u16>, reason: &str, remote: bool) {
            self.0
                .lock()
                .unwrap()
                .push(format!("close {code:?} {reason} {remote}"));
        }

        fn on_error(&self, err: &RpcError) {
            self.0.lock().unwrap().push(format!("error {err}"));
        }
    }

    init_logging();
    let events = Events::default();
    let (transport, mut peer) = create_memory_transport();
    let client = RpcClient::builder(transport)
        .hooks(events.clone())
        .build()
        .await?;

    peer.fail(RpcError::Transport("reset".into()))?;
    peer.close(1001, "going away")?;

    // Ordering on the inbound loop: round-trip one call to flush the events.
    let caller = client.clone();
    let flush = tokio::spawn(async move { caller.call("Flush", "op", &json!({})).await });
    let cmd = peer.next_command().await.expect("command");
    peer.reply(&cmd, &json!({}))?;
    flush.await.expect("flush panicked")?;

    assert_eq!(
        *events.0.lock().unwrap(),
        vec![
            "open".to_string(),
            "error transport error: reset".to_string(),
            "close Some(1001) going away true".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_open_failure_reaches_hooks() {
    // ---
    #[derive(Clone, Default)]
    struct Errors(Arc<Mutex<usize>>);

    impl ConnectionHooks for Errors {
        fn on_error(&self, _err: &RpcError) {
            *self.0.lock().unwrap() += 1;
        }
    }

    let errors = Errors::default();
    let (transport, _peer) = create_memory_transport();
    let _first = RpcClient::builder(transport.clone()).build().await.unwrap();

    let second = RpcClient::builder(transport)
        .hooks(errors.clone())
        .build()
        .await;
    assert!(matches!(second, Err(RpcError::Transport(_))));
    assert_eq!(*errors.0.lock().unwrap(), 1);
}

#[test]
fn test_blocking_result_shapes() {
    // ---
    init_logging();
    let rt = runtime();
    let (transport, peer) = create_memory_transport();
    let client = rt
        .block_on(RpcClient::builder(transport).build())
        .expect("client");
    spawn_echo_peer(&rt, peer);

    client
        .send_command_sync("Router", "reboot", &json!({}))
        .expect("no-result call");

    let value = client
        .send_command_value_sync("Router", "status", &json!({}))
        .expect("value call");
    assert_eq!(value["echo"], "status");

    let alt = client
        .send_command_alt_sync("Router", "status", &json!({}))
        .expect("alt call");
    let decoded: Value = amplink_rpc::codec::decode_alt(&alt).expect("alt decodes");
    assert_eq!(decoded["echo"], "status");

    #[derive(Deserialize)]
    struct Echo {
        echo: String,
        seq: u64,
    }
    let echo: Echo = client
        .send_command_as_sync("Router", "typed", &json!({}))
        .expect("typed call");
    assert_eq!(echo.echo, "typed");
    assert_eq!(echo.seq, 4);
}

#[test]
fn test_blocking_call_from_spawn_blocking() {
    // ---
    init_logging();
    let rt = runtime();
    let (transport, peer) = create_memory_transport();
    let client = rt
        .block_on(RpcClient::builder(transport).build())
        .expect("client");
    spawn_echo_peer(&rt, peer);

    let caller = client.clone();
    let value = rt
        .block_on(rt.spawn_blocking(move || {
            caller.send_command_value_sync("x", "y", &json!({}))
        }))
        .expect("blocking task panicked")
        .expect("call");
    assert_eq!(value["echo"], "y");
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn test_blocking_call_from_multi_thread_worker() {
    // ---
    init_logging();
    let rt = runtime();
    let (transport, peer) = create_memory_transport();
    let client = rt
        .block_on(RpcClient::builder(transport).build())
        .expect("client");
    spawn_echo_peer(&rt, peer);

    let caller = client.clone();
    let value = rt
        .block_on(rt.spawn(async move { caller.send_command_value_sync("Worker", "ping", &json!({})) }))
        .expect("worker task panicked")
        .expect("call");
    assert_eq!(value["echo"], "ping");
}

#[test]
fn test_blocking_calls_from_many_threads() {
    // ---
    init_logging();
    let rt = runtime();
    let (transport, peer) = create_memory_transport();
    let client = rt
        .block_on(RpcClient::builder(transport).build())
        .expect("client");
    spawn_echo_peer(&rt, peer);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let client = client.clone();
            std::thread::spawn(move || {
                for i in 0..10 {
                    let method = format!("w{worker}-{i}");
                    let value = client
                        .send_command_value_sync("Load", &method, &json!({}))
                        .expect("call");
                    assert_eq!(value["echo"], method.as_str());
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked");
    }
    assert_eq!(client.pending_count(), 0);
}

#[test]
fn test_one_thread_two_outstanding_blocking_calls() {
    // ---
    init_logging();
    let rt = runtime();
    let (transport, mut peer) = create_memory_transport();
    let client = rt
        .block_on(RpcClient::builder(transport).build())
        .expect("client");

    let first = client.begin_call("Multi", "one", &json!({})).expect("one");
    let second = client.begin_call("Multi", "two", &json!({})).expect("two");

    let one = peer.blocking_next_command().expect("cmd one");
    let two = peer.blocking_next_command().expect("cmd two");
    peer.reply(&two, &json!(2)).expect("reply two");
    peer.reply(&one, &json!(1)).expect("reply one");

    assert_eq!(second.wait().expect("two").payload.value, json!(2));
    assert_eq!(first.wait().expect("one").payload.value, json!(1));
}

#[test]
fn test_wait_from_other_thread_fails_fast() {
    // ---
    init_logging();
    let rt = runtime();
    let (transport, mut peer) = create_memory_transport();
    let client = rt
        .block_on(RpcClient::builder(transport).build())
        .expect("client");

    let call = client.begin_call("Ctx", "op", &json!({})).expect("call");
    let seq_id = call.seq_id();

    let result = std::thread::spawn(move || call.wait())
        .join()
        .expect("thread panicked");
    assert!(matches!(result, Err(RpcError::WrongContext { .. })));

    // The command itself went out and is still pending.
    assert!(client.is_pending(seq_id));
    assert_eq!(peer.blocking_next_command().expect("cmd").seq_id, seq_id);
}

#[test]
fn test_blocking_wait_timeout_and_abandon() {
    // ---
    init_logging();
    let rt = runtime();
    let (transport, _peer) = create_memory_transport();
    let client = rt
        .block_on(RpcClient::builder(transport).build())
        .expect("client");

    let call = client.begin_call("Mute", "op", &json!({})).expect("call");
    assert!(matches!(
        call.wait_timeout(Duration::from_millis(50)),
        Err(RpcError::Timeout)
    ));
    assert_eq!(client.pending_count(), 0);

    // A caller blocked without a deadline is released only by an explicit abandon.
    let blocked = {
        let client = client.clone();
        std::thread::spawn(move || client.send_command_value_sync("Mute", "forever", &json!({})))
    };

    while client.pending_count() == 0 {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(client.abandon_pending(), 1);

    let result = blocked.join().expect("blocked thread panicked");
    assert!(matches!(result, Err(RpcError::ConnectionClosed)));
}

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}
