// Build script to generate Rust code from protobuf definitions
use std::io::{Error, ErrorKind, Result};

fn main() -> Result<()> {
    // Fall back to the bundled protoc when the host does not provide one
    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()
            .map_err(|e| Error::new(ErrorKind::NotFound, e.to_string()))?;
        std::env::set_var("PROTOC", protoc);
    }

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/chat.proto", "proto/gateway.proto"], &["proto"])?;

    // Re-run build if any proto file changes
    println!("cargo:rerun-if-changed=proto/chat.proto");
    println!("cargo:rerun-if-changed=proto/gateway.proto");

    Ok(())
}
