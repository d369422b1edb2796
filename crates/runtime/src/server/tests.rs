use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use super::*;
use crate::channel::{RemoteValue, ping, remote_eval, remote_import, remote_shutdown};
use crate::connection::{Connection, ConnectionLike};
use crate::namespace::ModuleRegistry;

struct Greeter {
	name: String,
}

impl HostObject for Greeter {
	fn type_name(&self) -> &str {
		"Greeter"
	}

	fn get_attr(&self, name: &str) -> HostResult<HostValue> {
		match name {
			"name" => Ok(self.name.clone().into()),
			_ => Err(HostError::attribute(self.type_name(), name)),
		}
	}

	fn call(&self, method: &str, args: Vec<HostValue>) -> HostResult<HostValue> {
		match method {
			"greet" => {
				let who = args
					.first()
					.and_then(HostValue::as_data)
					.and_then(Value::as_str)
					.ok_or_else(|| HostError::type_error("greet takes a name"))?;
				Ok(format!("hello {who}").into())
			}
			"child" => Ok(HostValue::object(Greeter {
				name: format!("{}.child", self.name),
			})),
			"name_of" => {
				let other = args
					.first()
					.and_then(HostValue::as_object)
					.and_then(|object| object.downcast_ref::<Greeter>())
					.ok_or_else(|| HostError::type_error("name_of takes a Greeter"))?;
				Ok(other.name.clone().into())
			}
			"sleep" => {
				std::thread::sleep(Duration::from_millis(500));
				Ok(HostValue::none())
			}
			_ => Err(HostError::method(self.type_name(), method)),
		}
	}
}

fn namespace() -> Arc<dyn Namespace> {
	let registry = ModuleRegistry::new();
	registry.register_module(
		"greeter",
		Arc::new(Greeter {
			name: "bridge".to_string(),
		}),
	);
	registry.register_package("com.host.units", || Ok(Vec::new()));
	Arc::new(registry)
}

struct Running {
	parameters: ConnectionParameters,
	shutdown: ShutdownHandle,
	objects: Arc<ObjectStore>,
	task: tokio::task::JoinHandle<Result<()>>,
}

async fn start(parameters: ConnectionParameters) -> Running {
	let server = BridgeServer::bind(&parameters, namespace()).await.unwrap();
	let parameters = server.parameters().clone();
	let shutdown = server.shutdown_handle();
	let objects = server.objects();
	let task = tokio::spawn(server.serve());
	Running {
		parameters,
		shutdown,
		objects,
		task,
	}
}

/// Polls `check` for up to a second; releases travel in the background.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
	for _ in 0..100 {
		if check() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	check()
}

async fn connect(parameters: &ConnectionParameters) -> Arc<dyn ConnectionLike> {
	Connection::connect(parameters).await.unwrap()
}

#[tokio::test]
async fn test_bind_assigns_port() {
	let server = BridgeServer::bind(&ConnectionParameters::ephemeral(), namespace())
		.await
		.unwrap();

	let port = server.parameters().port;
	assert_ne!(port, 0);
	assert_eq!(server.local_addr().unwrap().port(), port);
}

#[tokio::test]
async fn test_bind_conflict_reports_address() {
	let first = BridgeServer::bind(&ConnectionParameters::ephemeral(), namespace())
		.await
		.unwrap();
	let taken = first.parameters().clone();

	let err = BridgeServer::bind(&taken, namespace()).await.err().unwrap();
	match err {
		Error::Bind { addr, .. } => assert_eq!(addr, taken.address()),
		other => panic!("expected bind error, got {other:?}"),
	}
}

#[tokio::test]
async fn test_ping_and_import() {
	let running = start(ConnectionParameters::ephemeral()).await;
	let connection = connect(&running.parameters).await;

	ping(&connection).await.unwrap();

	let greeter = remote_import(&connection, "greeter").await.unwrap();
	assert_eq!(greeter.type_name(), "Greeter");

	let err = remote_import(&connection, "com.host.units").await.unwrap_err();
	assert_eq!(err.error_name(), Some("ImportError"));

	running.shutdown.shutdown();
	running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_get_attr_and_call_round_trip() {
	let running = start(ConnectionParameters::ephemeral()).await;
	let connection = connect(&running.parameters).await;
	let greeter = remote_import(&connection, "greeter").await.unwrap();

	let name = greeter.get_attr("name").await.unwrap();
	assert_eq!(name.as_str(), Some("bridge"));

	let greeting = greeter.call("greet", vec![json!("world")]).await.unwrap();
	assert_eq!(greeting.as_str(), Some("hello world"));

	let child = greeter.call("child", Vec::new()).await.unwrap().into_object().unwrap();
	assert_ne!(child.guid(), greeter.guid());
	let child_name = greeter.call("name_of", vec![child.as_arg()]).await.unwrap();
	assert_eq!(child_name.as_str(), Some("bridge.child"));

	let err = greeter.get_attr("missing").await.unwrap_err();
	assert_eq!(err.error_name(), Some("AttributeError"));

	running.shutdown.shutdown();
	running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_released_handles_are_rejected() {
	let running = start(ConnectionParameters::ephemeral()).await;
	let connection = connect(&running.parameters).await;
	let greeter = remote_import(&connection, "greeter").await.unwrap();
	let stale = greeter.clone();

	greeter.release().await.unwrap();

	let err = stale.get_attr("name").await.unwrap_err();
	assert_eq!(err.error_name(), Some("ReferenceError"));

	running.shutdown.shutdown();
	running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_slow_host_call_times_out() {
	let server_params =
		ConnectionParameters::ephemeral().with_response_timeout(Duration::from_millis(100));
	let running = start(server_params).await;
	let client_params = running
		.parameters
		.clone()
		.with_response_timeout(Duration::from_secs(5));
	let connection = connect(&client_params).await;
	let greeter = remote_import(&connection, "greeter").await.unwrap();

	let err = greeter.call("sleep", Vec::new()).await.unwrap_err();
	assert_eq!(err.error_name(), Some("TimeoutError"));
	assert!(err.is_timeout());

	// The connection stays usable after a host-side timeout.
	ping(&connection).await.unwrap();

	running.shutdown.shutdown();
	running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unknown_method_is_protocol_error() {
	let running = start(ConnectionParameters::ephemeral()).await;
	let connection = connect(&running.parameters).await;

	let err = connection
		.send_message("", "frobnicate", Value::Null)
		.await
		.unwrap_err();
	assert_eq!(err.error_name(), Some("ProtocolError"));

	running.shutdown.shutdown();
	running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_handle_releases_port() {
	let running = start(ConnectionParameters::ephemeral()).await;
	let port = running.parameters.port;
	let _client = connect(&running.parameters).await;

	running.shutdown.shutdown();
	running.shutdown.shutdown();
	assert!(running.shutdown.is_shutdown());
	tokio::time::timeout(Duration::from_secs(5), running.task)
		.await
		.unwrap()
		.unwrap()
		.unwrap();

	std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
}

#[tokio::test]
async fn test_remote_shutdown_stops_serving() {
	let running = start(ConnectionParameters::ephemeral()).await;
	let connection = connect(&running.parameters).await;

	remote_shutdown(&connection).await.unwrap();

	tokio::time::timeout(Duration::from_secs(5), running.task)
		.await
		.unwrap()
		.unwrap()
		.unwrap();
	assert!(running.shutdown.is_shutdown());
	assert!(Connection::connect(&running.parameters).await.is_err());
}

#[tokio::test]
async fn test_nested_lists_carry_handles() {
	let running = start(ConnectionParameters::ephemeral()).await;
	let connection = connect(&running.parameters).await;
	let greeter = remote_import(&connection, "greeter").await.unwrap();

	let value = RemoteValue::decode(
		json!([greeter.as_arg(), 1, "two"]),
		&connection,
	);
	let RemoteValue::List(items) = value else {
		panic!("expected list");
	};
	assert_eq!(items[0].as_object().unwrap().guid(), greeter.guid());
	assert_eq!(items[1].as_data(), Some(&json!(1)));
	assert_eq!(items[2].as_str(), Some("two"));

	running.shutdown.shutdown();
	running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_eval_with_bindings() {
	let running = start(ConnectionParameters::ephemeral()).await;
	let connection = connect(&running.parameters).await;
	let greeter = remote_import(&connection, "greeter").await.unwrap();

	let name = remote_eval(&connection, "g.child().name", &[("g", greeter.as_arg())])
		.await
		.unwrap();
	assert_eq!(name.as_str(), Some("bridge.child"));

	let name = remote_eval(&connection, "greeter.name", &[]).await.unwrap();
	assert_eq!(name.as_str(), Some("bridge"));

	let child = remote_eval(&connection, "greeter.child()", &[])
		.await
		.unwrap()
		.into_object()
		.unwrap();
	assert_eq!(child.type_name(), "Greeter");

	let err = remote_eval(&connection, "nobody.name", &[]).await.unwrap_err();
	assert_eq!(err.error_name(), Some("NameError"));

	running.shutdown.shutdown();
	running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_dropped_proxies_release_their_handles() {
	let running = start(ConnectionParameters::ephemeral()).await;
	let connection = connect(&running.parameters).await;

	for _ in 0..3 {
		let greeter = remote_import(&connection, "greeter").await.unwrap();
		let child = greeter.call("child", Vec::new()).await.unwrap();
		assert_eq!(running.objects.len(), 2);
		drop(child);
		drop(greeter);
		assert!(eventually(|| running.objects.is_empty()).await);
	}

	let greeter = remote_import(&connection, "greeter").await.unwrap();
	let copy = greeter.clone();
	drop(greeter);
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert_eq!(running.objects.len(), 1);
	assert_eq!(copy.get_attr("name").await.unwrap().as_str(), Some("bridge"));
	drop(copy);
	assert!(eventually(|| running.objects.is_empty()).await);

	running.shutdown.shutdown();
	running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_disconnect_releases_client_handles() {
	let running = start(ConnectionParameters::ephemeral()).await;
	let leaving = connect(&running.parameters).await;
	let staying = connect(&running.parameters).await;
	let import = json!({ "name": "greeter" });

	leaving.send_message(ROOT_TARGET, method::IMPORT, import.clone()).await.unwrap();
	leaving.send_message(ROOT_TARGET, method::IMPORT, import.clone()).await.unwrap();
	let kept = staying.send_message(ROOT_TARGET, method::IMPORT, import).await.unwrap();
	assert_eq!(running.objects.len(), 3);

	drop(leaving);
	assert!(eventually(|| running.objects.len() == 1).await);
	let guid = decode_handle(&kept).unwrap().guid;
	assert!(running.objects.try_get(&guid).is_some());

	running.shutdown.shutdown();
	running.task.await.unwrap().unwrap();
	assert!(running.objects.is_empty());
}
