use cargo_postbuild::Action;

fn main() {
    Action::CopyHex.cargo_exec()
}
