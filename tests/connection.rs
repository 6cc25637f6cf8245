use bytes::Bytes;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedSender};

use respcli::codec::FrameCodec;
use respcli::connection::{Connection, Error};
use respcli::frame::{self, Frame};

async fn create_tcp_connection() -> Result<(UnboundedSender<Vec<u8>>, TcpStream), std::io::Error> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local_addr = listener.local_addr()?;

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            while let Some(data) = rx.recv().await {
                // Write the received channel data to the socket.
                if socket.write_all(&data).await.is_err() {
                    break;
                }
            }
            // Dropping the socket once the sender is gone closes the connection.
        }
    });

    // Connect to the server as a client to complete the setup.
    let stream = TcpStream::connect(local_addr).await?;

    Ok((tx, stream))
}

#[tokio::test]
async fn test_parse_single_string() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream);

    tcp_stream_tx.send(b"+OK\r\n".to_vec()).unwrap();

    let actual = connection.read_frame().await.unwrap();
    let expected = Some(Frame::Simple("OK".to_string()));

    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_parse_bulk_string() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream);

    tcp_stream_tx.send(b"$5\r\nhello\r\n".to_vec()).unwrap();

    let actual = connection.read_frame().await.unwrap();
    let expected = Some(Frame::Bulk(Bytes::from("hello")));

    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_parse_null_bulk_string_and_null_array() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream);

    tcp_stream_tx.send(b"$-1\r\n*-1\r\n$0\r\n\r\n".to_vec()).unwrap();

    assert_eq!(connection.read_frame().await.unwrap(), Some(Frame::Null));
    assert_eq!(
        connection.read_frame().await.unwrap(),
        Some(Frame::NullArray)
    );
    assert_eq!(
        connection.read_frame().await.unwrap(),
        Some(Frame::Bulk(Bytes::new()))
    );
}

#[tokio::test]
async fn test_parse_multiple_replies_sequentially() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream);

    let simple_string = b"+OK\r\n";
    let bulk_string = b"$5\r\nhello\r\n";
    let array_1 = b"*2\r\n$7\r\nmykey_1\r\n$9\r\nmyvalue_1\r\n";
    let array_2 = b"*2\r\n*1\r\n:1\r\n$-1\r\n";
    let simple_error = b"-ERR unknown command\r\n";
    let integer = b":1000\r\n";

    // Everything arrives in a single write, the decoder must split it.
    let mut all = Vec::new();
    for part in [
        &simple_string[..],
        &bulk_string[..],
        &array_1[..],
        &array_2[..],
        &simple_error[..],
        &integer[..],
    ] {
        all.extend_from_slice(part);
    }
    tcp_stream_tx.send(all).unwrap();

    let actual = connection.read_frame().await.unwrap();
    assert_eq!(actual, Some(Frame::Simple("OK".to_string())));

    let actual = connection.read_frame().await.unwrap();
    assert_eq!(actual, Some(Frame::Bulk(Bytes::from("hello"))));

    let actual = connection.read_frame().await.unwrap();
    assert_eq!(
        actual,
        Some(Frame::Array(vec![
            Frame::Bulk(Bytes::from("mykey_1")),
            Frame::Bulk(Bytes::from("myvalue_1")),
        ]))
    );

    let actual = connection.read_frame().await.unwrap();
    assert_eq!(
        actual,
        Some(Frame::Array(vec![
            Frame::Array(vec![Frame::Integer(1)]),
            Frame::Null,
        ]))
    );

    let actual = connection.read_frame().await.unwrap();
    assert_eq!(actual, Some(Frame::Error("ERR unknown command".to_string())));

    let actual = connection.read_frame().await.unwrap();
    assert_eq!(actual, Some(Frame::Integer(1000)));
}

#[tokio::test]
async fn test_parse_incomplete_frame() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream);

    // Reply split into three parts to simulate partial/incomplete data sending.
    // "*3\r\n$3\r\nSET\r\n$5\r\nmykey\r\n$7\r\nmyvalue\r\n";
    let part1 = b"*3\r\n$3\r\nSE";
    let part2 = b"T\r\n$5\r\nmyke";
    let part3 = b"y\r\n$7\r\nmyvalue\r\n";

    tokio::spawn(async move {
        let parts = vec![part1.to_vec(), part2.to_vec(), part3.to_vec()];
        for part in parts {
            tcp_stream_tx.send(part).unwrap();
            // Simulate a delay in sending/receiving the data.
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    });

    let actual = connection.read_frame().await.unwrap();
    let expected = Some(Frame::Array(vec![
        Frame::Bulk(Bytes::from("SET")),
        Frame::Bulk(Bytes::from("mykey")),
        Frame::Bulk(Bytes::from("myvalue")),
    ]));
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_parse_randomly_fragmented_frame() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream);

    let mut rng = rand::thread_rng();
    let payload: Vec<u8> = (0..4096).map(|_| rng.gen()).collect();
    let expected = Frame::Array(vec![
        Frame::Bulk(Bytes::from(payload)),
        Frame::Array(vec![Frame::Integer(-42), Frame::Null, Frame::NullArray]),
        Frame::Simple("OK".to_string()),
        Frame::Bulk(Bytes::from_static(b"trailing\r\n")),
    ]);
    let encoded = expected.serialize();

    // Deliver the encoding in randomly sized chunks.
    let mut start = 0;
    while start < encoded.len() {
        let end = (start + rng.gen_range(1..64)).min(encoded.len());
        tcp_stream_tx.send(encoded[start..end].to_vec()).unwrap();
        start = end;
    }
    drop(rng);

    let actual = connection.read_frame().await.unwrap();
    assert_eq!(actual, Some(expected));
}

#[tokio::test]
async fn test_clean_close_between_replies() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream);

    tcp_stream_tx.send(b":1\r\n".to_vec()).unwrap();
    drop(tcp_stream_tx);

    assert_eq!(connection.read_frame().await.unwrap(), Some(Frame::Integer(1)));
    assert_eq!(connection.read_frame().await.unwrap(), None);
}

#[tokio::test]
async fn test_close_in_the_middle_of_an_array() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream);

    // Three elements declared, two delivered.
    tcp_stream_tx.send(b"*3\r\n:1\r\n:2\r\n".to_vec()).unwrap();
    drop(tcp_stream_tx);

    let err = connection.read_frame().await.unwrap_err();
    assert!(matches!(err, Error::Decode(frame::Error::UnexpectedEof)));
}

#[tokio::test]
async fn test_close_in_the_middle_of_a_bulk_string() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream);

    tcp_stream_tx.send(b"$10\r\nhello".to_vec()).unwrap();
    drop(tcp_stream_tx);

    let err = connection.read_frame().await.unwrap_err();
    assert_eq!(err.to_string(), "unexpected end of stream");
}

#[tokio::test]
async fn test_unknown_response_type() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::new(tcp_stream);

    tcp_stream_tx.send(b"%1\r\n+a\r\n+b\r\n".to_vec()).unwrap();

    let err = connection.read_frame().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(frame::Error::InvalidDataType(b'%'))
    ));
}

#[tokio::test]
async fn test_reply_exceeding_max_frame_size() {
    let (tcp_stream_tx, tcp_stream) = create_tcp_connection().await.unwrap();
    let mut connection = Connection::with_codec(tcp_stream, FrameCodec::new(16));

    let mut reply = b"$64\r\n".to_vec();
    reply.extend_from_slice(&[b'x'; 32]);
    tcp_stream_tx.send(reply).unwrap();

    let err = connection.read_frame().await.unwrap_err();
    assert!(matches!(err, Error::FrameTooLarge(16)));
}

#[tokio::test]
async fn test_write_line() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let local_addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(socket).lines();
        let first = lines.next_line().await.unwrap();
        let second = lines.next_line().await.unwrap();
        (first, second)
    });

    let stream = TcpStream::connect(local_addr).await.unwrap();
    let mut connection = Connection::new(stream);
    connection.write_line("SET foo \"bar baz\"").await.unwrap();
    connection.write_line("GET foo").await.unwrap();

    let (first, second) = server.await.unwrap();
    assert_eq!(first.as_deref(), Some("SET foo \"bar baz\""));
    assert_eq!(second.as_deref(), Some("GET foo"));
}
