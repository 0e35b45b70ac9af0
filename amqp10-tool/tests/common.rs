use fe2o3_amqp::{Connection, Sender, Session};
use testcontainers::{
    clients::Cli,
    core::WaitFor,
    GenericImage,
    Container,
};
use tokio::sync::OnceCell;

static DOCKER: OnceCell<Cli> = OnceCell::const_new();

/// Starts an ActiveMQ Artemis broker that accepts anonymous connections
pub async fn setup_activemq_artemis() -> (Container<'static, GenericImage>, u16) {
    let docker = DOCKER.get_or_init(|| async { Cli::default() }).await;
    let image = GenericImage::new("docker.io/vromero/activemq-artemis", "latest")
        .with_env_var("DISABLE_SECURITY", "true")
        .with_exposed_port(5672)
        .with_wait_for(WaitFor::seconds(5));
    let node = docker.run(image);

    let port = node.get_host_port_ipv4(5672);
    (node, port)
}

/// Puts `count` messages on `queue`
pub async fn preload(url: &str, queue: &str, count: usize) {
    let mut connection = Connection::open("preload-connection", url).await.unwrap();
    let mut session = Session::begin(&mut connection).await.unwrap();
    let mut sender = Sender::attach(&mut session, "preload-sender", queue)
        .await
        .unwrap();

    for i in 0..count {
        let outcome = sender.send(format!("message-{i}")).await.unwrap();
        outcome.accepted_or("Not accepted").unwrap();
    }

    sender.close().await.unwrap();
    session.end().await.unwrap();
    connection.close().await.unwrap();
}
