//! Tests for module handles: parse status, lookups, stepping and arguments

mod common;

use std::collections::BTreeMap;

use common::{add_info, add_module, line_program, module_with, ModuleBuilder, ABBREV, ADD_LINES, SECOND_ROW};
use wasmdbg_core::host::Frame;
use wasmdbg_core::module::{ModuleHandle, ParseStatus, Severity, FUNCTION_NAME_NOT_FOUND, FUNCTION_NOT_FOUND};
use wasmdbg_core::types::{Address, ModuleId};
use wasmdbg_core::value::{FormattedValue, LocalValue};
use wasmdbg_core::SessionConfig;

fn parse(binary: Vec<u8>) -> ModuleHandle
{
    ModuleHandle::parse(ModuleId(0), binary, BTreeMap::new(), SessionConfig::default())
}

fn text(value: Option<&FormattedValue>) -> Option<&str>
{
    value.and_then(FormattedValue::as_text)
}

#[test]
fn test_end_to_end_arguments()
{
    let module = parse(add_module());
    assert_eq!(module.status(), &ParseStatus::Ok);
    assert_eq!(module.line_rows().len(), 3);
    assert_eq!(module.functions().len(), 1);

    let frame = Frame::new(
        module.code_offset() + SECOND_ROW,
        vec![LocalValue::I32(3), LocalValue::I32(4)],
        vec![0; 64],
    );
    let resolved = module.resolve_arguments(&frame).unwrap();

    assert_eq!(resolved.function, "add");
    assert_eq!(resolved.values.len(), 2);
    assert_eq!(text(resolved.get("a")), Some("(int) 3"));
    assert_eq!(text(resolved.get("b")), Some("(int) 4"));
    assert!(resolved.message.contains("COMPILER clang 17"));
    assert!(resolved.message.contains("NAME add.c"));
}

#[test]
fn test_lookups()
{
    let module = parse(add_module());
    let function = &module.functions().functions()[0];
    assert_eq!(function.low_pc, Some(Address::new(2)));
    assert_eq!(function.high_pc, Some(Address::new(9)));

    let row = module.line_for_address(Address::new(7)).unwrap();
    assert_eq!(row.line, 2);
    assert_eq!(row.file, "src/add.c");
    assert!(module.line_for_address(Address::new(2)).is_none());

    let code_offset = module.code_offset();
    assert_eq!(module.function_for_offset(code_offset + 8).map(|f| f.name.raw()), Some("add"));
    assert!(module.function_for_offset(code_offset + 1).is_none());
    assert!(module.function_for_offset(0).is_none());
}

#[test]
fn test_step_boundary_stops_at_line_change_and_branch()
{
    let module = parse(add_module());
    let code_offset = module.code_offset();

    // local.get 0 is alone on line 1
    assert_eq!(module.next_step_boundary(code_offset + 3), Some(code_offset + 5));
    // line 2 runs until `end`, which may branch
    assert_eq!(module.next_step_boundary(code_offset + 5), Some(code_offset + 8));
    // not an instruction start
    assert_eq!(module.next_step_boundary(code_offset + 4), None);
}

#[test]
fn test_export_names()
{
    let module = parse(add_module());
    assert_eq!(module.instructions().function_name(1), Some("add"));

    let live = BTreeMap::from([(0, "add_live".to_string())]);
    let module = ModuleHandle::parse(ModuleId(1), add_module(), live, SessionConfig::default());
    assert_eq!(module.instructions().function_name(1), Some("add_live"));
}

#[test]
fn test_missing_sections()
{
    let binary = ModuleBuilder::new()
        .code(&[common::ADD_BODY])
        .custom(".debug_line", &line_program(ADD_LINES))
        .build();
    let module = parse(binary);

    let ParseStatus::MissingSections(missing) = module.status() else {
        panic!("unexpected status {:?}", module.status());
    };
    assert_eq!(missing, &[".debug_str", ".debug_abbrev", ".debug_info"]);
    assert_eq!(module.status().title(), "Incomplete DWARF debug info in WASM");
    assert_eq!(module.line_rows().len(), 3);
    assert!(module.functions().is_empty());
    assert_eq!(module.instructions().len(), 4);

    let err = module.resolve_arguments(&Frame::default()).unwrap_err();
    assert_eq!(err.severity, Severity::Warning);
    assert_eq!(err.title, "Incomplete DWARF debug info in WASM");
}

#[test]
fn test_no_debug_info()
{
    let module = parse(ModuleBuilder::new().code(&[common::ADD_BODY]).build());
    assert_eq!(module.status().title(), "No DWARF debug info in WASM");
    assert!(!module.status().is_usable());
}

#[test]
fn test_structural_failure_is_captured()
{
    let abbrev = [1, 0x11, 1, 0, 0, 1, 0x2e, 0, 0, 0, 0];
    let module = parse(module_with(&line_program(ADD_LINES), &abbrev, &add_info(&["a"], None)));

    let ParseStatus::Error { title, message } = module.status() else {
        panic!("unexpected status {:?}", module.status());
    };
    assert_eq!(title, "Parse Error");
    assert_eq!(message, "Duplicate abbreviation code 1");

    let err = module.resolve_arguments(&Frame::default()).unwrap_err();
    assert_eq!(err.severity, Severity::Error);
    assert_eq!(err.to_string(), "Parse Error: Duplicate abbreviation code 1");
}

#[test]
fn test_garbage_binary()
{
    let module = parse(b"\0asm\x01\0\0\0\x0a\x20".to_vec());
    assert!(matches!(module.status(), ParseStatus::Error { .. }));
    assert!(module.functions().is_empty());
    assert!(module.instructions().is_empty());
}

#[test]
fn test_multiple_line_programs_warn()
{
    let mut lines = line_program(ADD_LINES);
    lines.extend(line_program(&[1]));
    let module = parse(module_with(&lines, ABBREV, &add_info(&["a", "b"], None)));

    assert_eq!(
        module.status(),
        &ParseStatus::Warning("(Found 2 dwarf sections, only the first was used)".to_string())
    );
    assert!(module.status().is_usable());
    assert_eq!(module.line_rows().len(), 3);
}

#[test]
fn test_function_not_found()
{
    let module = parse(add_module());
    let frame = Frame::new(module.code_offset() + 1, Vec::new(), Vec::new());
    let err = module.resolve_arguments(&frame).unwrap_err();

    assert_eq!(err.severity, Severity::Warning);
    assert_eq!(err.title, "Function not found");
    assert_eq!(err.message, "Looked for wasm byte offset 1");
}

#[test]
fn test_function_found_by_name()
{
    let module = parse(add_module());
    let frame = Frame::in_function("add (wasm-function[1])", vec![LocalValue::I32(8), LocalValue::I32(9)], Vec::new());
    let resolved = module.resolve_arguments(&frame).unwrap();

    assert_eq!(resolved.function, "add");
    assert_eq!(text(resolved.get("a")), Some("(int) 8"));
    assert_eq!(text(resolved.get("b")), Some("(int) 9"));
}

#[test]
fn test_function_name_lookup_failures()
{
    let module = parse(add_module());

    let err = module
        .resolve_arguments(&Frame::in_function("sub", Vec::new(), Vec::new()))
        .unwrap_err();
    assert_eq!(err.severity, Severity::Warning);
    assert_eq!(err.title, FUNCTION_NOT_FOUND);
    assert_eq!(err.message, "No function named sub. Found functions add");

    let err = module.resolve_arguments(&Frame::default()).unwrap_err();
    assert_eq!(err.title, FUNCTION_NAME_NOT_FOUND);
    let err = module
        .resolve_arguments(&Frame::in_function("(anonymous)", Vec::new(), Vec::new()))
        .unwrap_err();
    assert_eq!(err.title, FUNCTION_NAME_NOT_FOUND);
}

#[test]
fn test_duplicate_names_and_missing_locals()
{
    let module = parse(module_with(
        &line_program(ADD_LINES),
        ABBREV,
        &add_info(&["x", "x", "x"], None),
    ));
    let frame = Frame::new(module.code_offset() + SECOND_ROW, vec![LocalValue::I32(1), LocalValue::I32(2)], Vec::new());
    let resolved = module.resolve_arguments(&frame).unwrap();

    let names: Vec<_> = resolved.values.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, ["x", "x1", "x2"]);
    assert_eq!(text(resolved.get("x1")), Some("(int) 2"));
    assert_eq!(text(resolved.get("x2")), Some("<no value for local arg#2>"));
}

#[test]
fn test_unresolved_parameter_type()
{
    let module = parse(module_with(
        &line_program(ADD_LINES),
        ABBREV,
        &add_info(&["a"], Some(200)),
    ));
    let frame = Frame::new(module.code_offset() + SECOND_ROW, vec![LocalValue::I32(1)], Vec::new());
    let resolved = module.resolve_arguments(&frame).unwrap();
    assert_eq!(text(resolved.get("a")), Some("Unresolved address 200"));
}

#[test]
fn test_reparse()
{
    let module = parse(add_module());
    let again = module.reparse();
    assert_eq!(again.id(), module.id());
    assert_eq!(again.status(), module.status());
    assert_eq!(again.functions().len(), module.functions().len());
    assert_eq!(again.binary(), module.binary());
}
