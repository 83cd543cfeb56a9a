//! End-to-end scenarios driven straight off synthesized Wasm bytes
//! (`spec.md` §8).

use assert_matches::assert_matches;
use fusewasm::{
    call::{call_direct, CallStack},
    config::{CompileOptions, EngineConfig},
    linker::NoHostImports,
    load_and_instantiate,
    loader::ExportDesc,
    FuncIdx, Store, TrapCode,
};

fn wat2wasm(src: &str) -> Vec<u8> {
    wat::parse_str(src).unwrap()
}

fn instantiate(wat: &str) -> (Store, fusewasm::ModuleId) {
    let mut store = Store::new();
    let bytes = wat2wasm(wat);
    let id = load_and_instantiate(
        &mut store,
        "m",
        &bytes,
        &NoHostImports,
        &EngineConfig::default(),
        &CompileOptions::default(),
    )
    .expect("module loads and instantiates");
    (store, id)
}

fn export_func(store: &Store, module: fusewasm::ModuleId, name: &str) -> FuncIdx {
    match store.module(module).exports[name] {
        ExportDesc::Func(idx) => FuncIdx::from_u32(idx),
        _ => panic!("export {name:?} is not a function"),
    }
}

#[test]
fn arithmetic_add() {
    let (store, module) = instantiate(
        r#"
        (module
            (func (export "add") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.add))
        "#,
    );
    let func = export_func(&store, module, "add");
    let mut call_stack = CallStack::new();

    let mut params = Vec::new();
    params.extend_from_slice(&2i32.to_le_bytes());
    params.extend_from_slice(&3i32.to_le_bytes());
    let mut result = [0u8; 4];
    call_direct(&store, &mut call_stack, module, func, &params, &mut result).unwrap();
    assert_eq!(result, 4i32.to_le_bytes());

    let mut params = Vec::new();
    params.extend_from_slice(&i32::MAX.to_le_bytes());
    params.extend_from_slice(&1i32.to_le_bytes());
    let mut result = [0u8; 4];
    call_direct(&store, &mut call_stack, module, func, &params, &mut result).unwrap();
    assert_eq!(result, i32::MIN.to_le_bytes());
}

#[test]
fn integer_divide_by_zero_traps() {
    let (store, module) = instantiate(
        r#"
        (module
            (func (export "div") (param i32 i32) (result i32)
                local.get 0
                local.get 1
                i32.div_s))
        "#,
    );
    let func = export_func(&store, module, "div");
    let mut call_stack = CallStack::new();

    let mut params = Vec::new();
    params.extend_from_slice(&1i32.to_le_bytes());
    params.extend_from_slice(&0i32.to_le_bytes());
    let mut result = [0u8; 4];
    let trap = call_direct(&store, &mut call_stack, module, func, &params, &mut result).unwrap_err();
    assert_eq!(trap.code(), TrapCode::IntegerDivideByZero);
}

#[test]
fn memory_out_of_bounds_reports_operand_tuple() {
    let (store, module) = instantiate(
        r#"
        (module
            (memory 1)
            (func (export "load") (param i32) (result i32)
                local.get 0
                i32.load offset=0x10000))
        "#,
    );
    let func = export_func(&store, module, "load");
    let mut call_stack = CallStack::new();

    let params = 0i32.to_le_bytes();
    let mut result = [0u8; 4];
    let trap = call_direct(&store, &mut call_stack, module, func, &params, &mut result).unwrap_err();
    assert_eq!(trap.code(), TrapCode::MemoryOutOfBounds);
    let detail = trap.memory_detail().unwrap();
    assert_eq!(detail.static_offset, 0x1_0000);
    assert_eq!(detail.address, 0);
    assert_eq!(detail.effective_offset, 0x1_0000);
    assert_eq!(detail.memory_len, 0x1_0000);
    assert_eq!(detail.access_width, 4);
}

#[test]
fn indirect_call_signature_mismatch_traps() {
    let (store, module) = instantiate(
        r#"
        (module
            (type $ret_i32 (func (result i32)))
            (type $take_i32 (func (param i32) (result i32)))
            (func $seven (result i32) i32.const 7)
            (table 1 funcref)
            (elem (i32.const 0) $seven)
            (func (export "call_it") (param i32) (result i32)
                local.get 0
                i32.const 0
                call_indirect (type $take_i32)))
        "#,
    );
    let func = export_func(&store, module, "call_it");
    let mut call_stack = CallStack::new();

    let params = 0i32.to_le_bytes();
    let mut result = [0u8; 4];
    let trap = call_direct(&store, &mut call_stack, module, func, &params, &mut result).unwrap_err();
    assert_matches!(trap.code(), TrapCode::BadSignature);
}
