//! GID decoding command.

use contentsync_gid::{canonicalize_address, is_valid_wire_gid, Gid};

/// Decodes a GID and prints its components.
pub fn run(input: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(gid) = Gid::parse(input) else {
        println!("error::malformed identifier: {input}");
        return Ok(());
    };

    println!("success::decoded {input}");
    println!("  origin node: {}", gid.origin_node_id());
    println!("  content id:  {}", gid.content_id());
    match gid.network_address() {
        Some(address) => {
            println!("  network:     {} (remote)", address);
            println!("  canonical:   {}", canonicalize_address(address));
        }
        None => println!("  network:     local"),
    }
    println!(
        "  wire-valid:  {}",
        if is_valid_wire_gid(input) { "yes" } else { "no" }
    );

    Ok(())
}
