use replikv::server::ConnectionServer;
use replikv::store;

use test_utils::TestClient;

#[tokio::test]
async fn test_set_get_round_trip() {
    let server = ConnectionServer::new("127.0.0.1:0", store::standalone());
    server.start().await.expect("start server");
    let addr = server.local_addr().await.expect("bound address");

    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.send("SET user alice").await, "OK");
    assert_eq!(client.send("GET user").await, "alice");
    assert_eq!(client.send("SET user bob").await, "OK");
    assert_eq!(client.send("GET user").await, "bob");
    assert_eq!(client.send("EXIT").await, "Bye!");

    server.stop().await;
}

#[tokio::test]
async fn test_lowercase_verbs_accepted() {
    let server = ConnectionServer::new("127.0.0.1:0", store::standalone());
    server.start().await.expect("start server");
    let addr = server.local_addr().await.expect("bound address");

    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.send("set user alice").await, "OK");
    assert_eq!(client.send("get user").await, "alice");
    assert_eq!(client.send("Get user").await, "alice");
    assert_eq!(client.send("exit").await, "Bye!");
    assert!(client.at_eof().await);

    server.stop().await;
}

#[tokio::test]
async fn test_protocol_error_responses() {
    let server = ConnectionServer::new("127.0.0.1:0", store::standalone());
    server.start().await.expect("start server");
    let addr = server.local_addr().await.expect("bound address");

    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.send("GET missing").await, "ERROR: Key not found");
    assert_eq!(client.send("SET").await, "ERROR: Usage SET key value");
    assert_eq!(client.send("SET a").await, "ERROR: Usage SET key value");
    assert_eq!(client.send("SET a b c").await, "ERROR: Usage SET key value");
    assert_eq!(client.send("GET").await, "ERROR: Usage GET key");
    assert_eq!(client.send("GET a b").await, "ERROR: Usage GET key");
    assert_eq!(client.send("DELETE a").await, "ERROR: Unknown command");
    assert_eq!(client.send("").await, "ERROR: Unknown command");

    // The connection survives every protocol error
    assert_eq!(client.send("SET a 1").await, "OK");
    assert_eq!(client.send("GET a").await, "1");

    server.stop().await;
}

#[tokio::test]
async fn test_exit_closes_connection() {
    let server = ConnectionServer::new("127.0.0.1:0", store::standalone());
    server.start().await.expect("start server");
    let addr = server.local_addr().await.expect("bound address");

    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.send("EXIT").await, "Bye!");
    assert!(client.at_eof().await);

    server.stop().await;
}

#[tokio::test]
async fn test_values_visible_across_connections() {
    let server = ConnectionServer::new("127.0.0.1:0", store::standalone());
    server.start().await.expect("start server");
    let addr = server.local_addr().await.expect("bound address");

    let mut writer = TestClient::connect(addr).await;
    assert_eq!(writer.send("SET shared 42").await, "OK");

    let mut reader = TestClient::connect(addr).await;
    assert_eq!(reader.send("GET shared").await, "42");

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_clients() {
    let server = ConnectionServer::new("127.0.0.1:0", store::standalone());
    server.start().await.expect("start server");
    let addr = server.local_addr().await.expect("bound address");

    let mut handles = Vec::new();
    for task in 0..8 {
        handles.push(tokio::spawn(async move {
            let mut client = TestClient::connect(addr).await;
            for i in 0..20 {
                let key = format!("key-{}-{}", task, i);
                assert_eq!(client.send(&format!("SET {} {}", key, i)).await, "OK");
                assert_eq!(client.send(&format!("GET {}", key)).await, format!("{}", i));
            }
            assert_eq!(client.send("EXIT").await, "Bye!");
        }));
    }
    for handle in handles {
        handle.await.expect("client task");
    }

    // Every write is visible to a late connection
    let mut checker = TestClient::connect(addr).await;
    assert_eq!(checker.send("GET key-0-0").await, "0");
    assert_eq!(checker.send("GET key-7-19").await, "19");

    server.stop().await;
}
