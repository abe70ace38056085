use cargo_postbuild::Action;

fn main() {
    Action::ToBin.cargo_exec()
}
