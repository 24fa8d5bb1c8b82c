use crate::env::Environments;
use crate::heap::Heap;
use crate::primitives::Primitive;
use crate::symbol::{sym, SymbolTable};
use crate::value::Value;

/// Populate the global frame.
/// Pre-installs:
///   - every primitive under its name
///   - PI and E
pub fn install_globals(heap: &mut Heap, symbols: &mut SymbolTable, envs: &mut Environments) {
    let global = envs.global();

    for &prim in Primitive::ALL {
        let name = symbols.intern(prim.name());
        envs.define(heap, global, name, Value::Primitive(prim));
    }

    envs.define(heap, global, sym::PI, Value::Real(std::f64::consts::PI));
    envs.define(heap, global, sym::E, Value::Real(std::f64::consts::E));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_and_constants_are_bound() {
        let mut heap = Heap::new(1024);
        let mut symbols = SymbolTable::new();
        let mut envs = Environments::new();
        install_globals(&mut heap, &mut symbols, &mut envs);

        let car = symbols.lookup("car").unwrap();
        assert_eq!(envs.lookup(envs.global(), car), Some(Value::Primitive(Primitive::Car)));
        assert_eq!(
            envs.lookup(envs.global(), sym::PI),
            Some(Value::Real(std::f64::consts::PI))
        );
        // Nothing lands in the arena.
        assert_eq!(heap.stats().live_blocks, 0);
    }
}
