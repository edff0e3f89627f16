// Built-in function modules, one file per functional area. Each module
// exposes `register_all(&mut Registry)`; this file just fans out to them.

mod arithmetic;
mod fs;
mod lambda;
mod lists;
mod logic;
mod maps;
mod path;
mod random;
mod strings;
mod types;

pub fn register_all(reg: &mut crate::registry::Registry) {
    arithmetic::register_all(reg);
    logic::register_all(reg);
    types::register_all(reg);
    lists::register_all(reg);
    maps::register_all(reg);
    strings::register_all(reg);
    path::register_all(reg);
    fs::register_all(reg);
    lambda::register_all(reg);
    random::register_all(reg);
}
