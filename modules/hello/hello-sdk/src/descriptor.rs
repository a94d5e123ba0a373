//! Static description of the hello client contract.

use client_contract::{ClientDescriptor, OperationDescriptor, ReturnMode};

/// Operation name of [`HelloClient::say_hello`](crate::HelloClient::say_hello)
pub const SAY_HELLO: &str = "sayHello";

/// Operation name of [`HelloClient::say_hello_two`](crate::HelloClient::say_hello_two)
pub const SAY_HELLO_TWO: &str = "sayHelloTwo";

/// Path variable carrying the greeted name
pub const NAME_VAR: &str = "name";

/// `/hello` with default version `1`; `sayHelloTwo` overrides it with `2`.
pub static HELLO_CLIENT: ClientDescriptor = ClientDescriptor {
    id: "hello",
    base_path: "/hello",
    default_version: Some("1"),
    operations: &[
        OperationDescriptor {
            name: SAY_HELLO,
            method: http::Method::GET,
            path: "/greeting/{name}",
            version: None,
            return_mode: ReturnMode::Blocking,
        },
        OperationDescriptor {
            name: SAY_HELLO_TWO,
            method: http::Method::GET,
            path: "/greeting/{name}",
            version: Some("2"),
            return_mode: ReturnMode::Deferred,
        },
    ],
};

#[must_use]
pub fn descriptor() -> &'static ClientDescriptor {
    &HELLO_CLIENT
}
