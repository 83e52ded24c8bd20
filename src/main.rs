fn main() {
    std::process::exit(node_bridge_lib::run())
}
