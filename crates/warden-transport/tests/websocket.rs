//! Integration tests for the WebSocket agent feed.
//!
//! A real listener and a real `tokio-tungstenite` client, so the frames
//! actually cross a socket.

#[cfg(feature = "websocket")]
mod websocket {
    use std::io;
    use std::time::Duration;

    use futures_util::SinkExt;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;
    use warden_transport::{Connection, FeedLimits, Transport, TransportError, WebSocketTransport};

    async fn connect_agent(
        addr: std::net::SocketAddr,
    ) -> tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    > {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("agent should connect");
        ws
    }

    #[tokio::test]
    async fn test_websocket_receives_text_and_binary_frames() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().unwrap();

        let accept = tokio::spawn(async move { transport.accept().await.expect("should accept") });
        let mut agent = connect_agent(addr).await;
        let conn = accept.await.expect("task should complete");
        assert!(conn.id().into_inner() > 0);
        assert!(conn.peer_addr().ip().is_loopback());

        agent
            .send(Message::Text(r#"{"name":"discFromServer","lobbyId":1}"#.into()))
            .await
            .unwrap();
        agent
            .send(Message::Binary(b"raw frame".to_vec().into()))
            .await
            .unwrap();

        let first = conn.recv().await.unwrap().unwrap();
        assert_eq!(first, br#"{"name":"discFromServer","lobbyId":1}"#);
        let second = conn.recv().await.unwrap().unwrap();
        assert_eq!(second, b"raw frame");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_agent_close() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().unwrap();

        let accept = tokio::spawn(async move { transport.accept().await.expect("should accept") });
        let mut agent = connect_agent(addr).await;
        let conn = accept.await.unwrap();

        agent.send(Message::Close(None)).await.unwrap();

        let result = conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on agent close");
    }

    #[tokio::test]
    async fn test_websocket_accept_skips_stalled_handshake() {
        let limits = FeedLimits {
            handshake_timeout: Duration::from_millis(200),
            ..FeedLimits::default()
        };
        let mut transport = WebSocketTransport::bind_with("127.0.0.1:0", limits)
            .await
            .expect("should bind");
        let addr = transport.local_addr().unwrap();

        // Opens TCP and then says nothing.
        let mut silent = TcpStream::connect(addr).await.unwrap();
        silent.write_all(b"GET / HTTP/1.1\r\n").await.unwrap();

        let accept = tokio::spawn(async move { transport.accept().await.expect("should accept") });
        let mut agent = connect_agent(addr).await;
        let conn = tokio::time::timeout(Duration::from_secs(5), accept)
            .await
            .expect("a stalled peer must not hold up the next agent")
            .unwrap();

        agent.send(Message::Text("hello".into())).await.unwrap();
        assert_eq!(conn.recv().await.unwrap().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_websocket_oversized_frame_fails_recv() {
        let limits = FeedLimits {
            max_frame_bytes: 1024,
            ..FeedLimits::default()
        };
        let mut transport = WebSocketTransport::bind_with("127.0.0.1:0", limits)
            .await
            .expect("should bind");
        let addr = transport.local_addr().unwrap();

        let accept = tokio::spawn(async move { transport.accept().await.expect("should accept") });
        let mut agent = connect_agent(addr).await;
        let conn = accept.await.unwrap();

        agent
            .send(Message::Binary(vec![b'x'; 4096].into()))
            .await
            .unwrap();

        match conn.recv().await {
            Err(TransportError::ReceiveFailed(e)) => assert_eq!(e.kind(), io::ErrorKind::InvalidData),
            other => panic!("expected ReceiveFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_websocket_close_after_agent_left_is_ok() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().unwrap();

        let accept = tokio::spawn(async move { transport.accept().await.expect("should accept") });
        let mut agent = connect_agent(addr).await;
        let conn = accept.await.unwrap();

        agent.close(None).await.unwrap();
        assert!(conn.recv().await.unwrap().is_none());

        conn.close().await.expect("closing twice is not an error");
        conn.close().await.expect("closing twice is not an error");
    }
}
