use foo_controller::crd::Foo;
use kube::CustomResourceExt;

/// Print the Foo CustomResourceDefinition as JSON
///
/// `kubectl apply -f <(cargo run --bin gen-crd)` installs it directly.
fn main() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&Foo::crd())?);
    Ok(())
}
