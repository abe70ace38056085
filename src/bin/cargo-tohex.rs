use cargo_postbuild::Action;

fn main() {
    Action::ToHex.cargo_exec()
}
