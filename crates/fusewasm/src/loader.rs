//! Module loader and validator (`SPEC_FULL.md` §4.9): the external,
//! `wasmparser`-grounded front end that turns a raw `.wasm` byte stream
//! into the shape the translator (`translator` module) consumes. This
//! layer owns parsing and validation; it never builds an `Instr` stream.

use fusewasm_core::{FuncType, ValType};

use crate::error::ModuleError;

fn val_type(ty: wasmparser::ValType) -> Result<ValType, ModuleError> {
    match ty {
        wasmparser::ValType::I32 => Ok(ValType::I32),
        wasmparser::ValType::I64 => Ok(ValType::I64),
        wasmparser::ValType::F32 => Ok(ValType::F32),
        wasmparser::ValType::F64 => Ok(ValType::F64),
        other => Err(ModuleError::Unsupported(format!("value type {other:?} (SIMD/reference types beyond funcref are out of scope)"))),
    }
}

/// A constant initializer, as used by global, element and data segment
/// offsets (`spec.md` §3). The MVP restricts these to a single constant
/// instruction or a `global.get` of an immutable imported global.
#[derive(Clone, Debug)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// References a function for a table element init (`ref.func`), or
    /// `None` for `ref.null func`.
    FuncRef(Option<u32>),
    /// Reads an imported global's value at instantiation time.
    GlobalGet(u32),
}

/// One declared import (`spec.md` §3).
#[derive(Clone, Debug)]
pub struct ImportEntry {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

#[derive(Clone, Debug)]
pub enum ImportDesc {
    Func(u32),
    Table { element_is_func: bool, min: u32, max: Option<u32> },
    Memory { min: u32, max: Option<u32> },
    Global { ty: ValType, mutable: bool },
}

/// One declared export (`spec.md` §3).
#[derive(Clone, Debug)]
pub struct ExportEntry {
    pub name: String,
    pub desc: ExportDesc,
}

#[derive(Clone, Copy, Debug)]
pub enum ExportDesc {
    Func(u32),
    Table(u32),
    Memory(u32),
    Global(u32),
}

#[derive(Clone, Debug)]
pub struct GlobalDef {
    pub ty: ValType,
    pub mutable: bool,
    pub init: ConstExpr,
}

#[derive(Clone, Debug)]
pub struct TableDef {
    pub min: u32,
    pub max: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct MemoryDef {
    pub min: u32,
    pub max: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct ElementSegment {
    pub table_index: u32,
    pub offset: ConstExpr,
    pub items: Vec<Option<u32>>,
}

#[derive(Clone, Debug)]
pub struct DataSegment {
    pub memory_index: u32,
    pub offset: ConstExpr,
    pub bytes: Vec<u8>,
}

/// One raw (unvalidated-by-us, `wasmparser`-validated) function body, held
/// as its operator stream for the translator to consume (`spec.md` §4.4).
#[derive(Clone, Debug)]
pub struct RawFunctionBody {
    pub locals: Vec<(u32, ValType)>,
    pub operators: Vec<wasmparser::Operator<'static>>,
}

/// The parsed-and-validated shape of one module, ready for the translator
/// and linker (`spec.md` §3, §4.9).
#[derive(Clone, Debug, Default)]
pub struct ParsedModule {
    pub types: Vec<FuncType>,
    pub imports: Vec<ImportEntry>,
    /// Type index of every locally defined function, in order.
    pub func_type_indices: Vec<u32>,
    pub tables: Vec<TableDef>,
    pub memories: Vec<MemoryDef>,
    pub globals: Vec<GlobalDef>,
    pub exports: Vec<ExportEntry>,
    pub start: Option<u32>,
    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment>,
    pub bodies: Vec<RawFunctionBody>,
    /// Debug names for local functions, from the custom `name` section,
    /// keyed by the combined-space function index (`SPEC_FULL.md` §3).
    pub function_names: std::collections::BTreeMap<u32, String>,
}

fn func_type_from_wasmparser(ty: &wasmparser::FuncType) -> Result<FuncType, ModuleError> {
    let params = ty.params().iter().map(|t| val_type(*t)).collect::<Result<Vec<_>, _>>()?;
    let results = ty.results().iter().map(|t| val_type(*t)).collect::<Result<Vec<_>, _>>()?;
    Ok(FuncType::new(params, results))
}

fn const_expr(expr: &wasmparser::ConstExpr<'_>) -> Result<ConstExpr, ModuleError> {
    let mut reader = expr.get_operators_reader();
    let op = reader
        .read()
        .map_err(|e| ModuleError::Malformed(e.to_string()))?;
    let result = match op {
        wasmparser::Operator::I32Const { value } => ConstExpr::I32(value),
        wasmparser::Operator::I64Const { value } => ConstExpr::I64(value),
        wasmparser::Operator::F32Const { value } => ConstExpr::F32(f32::from_bits(value.bits())),
        wasmparser::Operator::F64Const { value } => ConstExpr::F64(f64::from_bits(value.bits())),
        wasmparser::Operator::GlobalGet { global_index } => ConstExpr::GlobalGet(global_index),
        wasmparser::Operator::RefFunc { function_index } => ConstExpr::FuncRef(Some(function_index)),
        wasmparser::Operator::RefNull { .. } => ConstExpr::FuncRef(None),
        other => return Err(ModuleError::Unsupported(format!("non-constant init expression: {other:?}"))),
    };
    Ok(result)
}

/// Parses and validates one Wasm binary module (`spec.md` §4.9). Runs
/// `wasmparser`'s full validator over the byte stream before any data is
/// extracted, so a malformed or invalid module never reaches the
/// translator.
pub fn load_module(bytes: &[u8]) -> Result<ParsedModule, ModuleError> {
    let mut validator = wasmparser::Validator::new();
    validator.validate_all(bytes)?;

    let mut parsed = ParsedModule::default();

    for payload in wasmparser::Parser::new(0).parse_all(bytes) {
        let payload = payload?;
        match payload {
            wasmparser::Payload::TypeSection(reader) => {
                for group in reader {
                    let group = group?;
                    for ty in group.into_types() {
                        let func_ty = ty
                            .composite_type
                            .inner
                            .unwrap_func()
                            .ok_or_else(|| ModuleError::Unsupported("non-function type".into()))?;
                        parsed.types.push(func_type_from_wasmparser(func_ty)?);
                    }
                }
            }
            wasmparser::Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import?;
                    let desc = match import.ty {
                        wasmparser::TypeRef::Func(idx) => ImportDesc::Func(idx),
                        wasmparser::TypeRef::Table(t) => ImportDesc::Table {
                            element_is_func: matches!(t.element_type, wasmparser::RefType::FUNCREF),
                            min: t.initial as u32,
                            max: t.maximum.map(|m| m as u32),
                        },
                        wasmparser::TypeRef::Memory(m) => ImportDesc::Memory {
                            min: m.initial as u32,
                            max: m.maximum.map(|v| v as u32),
                        },
                        wasmparser::TypeRef::Global(g) => ImportDesc::Global {
                            ty: val_type(g.content_type)?,
                            mutable: g.mutable,
                        },
                        wasmparser::TypeRef::Tag(_) => {
                            return Err(ModuleError::Unsupported("exception-handling tags".into()))
                        }
                    };
                    parsed.imports.push(ImportEntry {
                        module: import.module.to_string(),
                        name: import.name.to_string(),
                        desc,
                    });
                }
            }
            wasmparser::Payload::FunctionSection(reader) => {
                for ty in reader {
                    parsed.func_type_indices.push(ty?);
                }
            }
            wasmparser::Payload::TableSection(reader) => {
                for table in reader {
                    let table = table?;
                    parsed.tables.push(TableDef {
                        min: table.ty.initial as u32,
                        max: table.ty.maximum.map(|m| m as u32),
                    });
                }
            }
            wasmparser::Payload::MemorySection(reader) => {
                for mem in reader {
                    let mem = mem?;
                    parsed.memories.push(MemoryDef {
                        min: mem.initial as u32,
                        max: mem.maximum.map(|m| m as u32),
                    });
                }
            }
            wasmparser::Payload::GlobalSection(reader) => {
                for global in reader {
                    let global = global?;
                    parsed.globals.push(GlobalDef {
                        ty: val_type(global.ty.content_type)?,
                        mutable: global.ty.mutable,
                        init: const_expr(&global.init_expr)?,
                    });
                }
            }
            wasmparser::Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export?;
                    let desc = match export.kind {
                        wasmparser::ExternalKind::Func => ExportDesc::Func(export.index),
                        wasmparser::ExternalKind::Table => ExportDesc::Table(export.index),
                        wasmparser::ExternalKind::Memory => ExportDesc::Memory(export.index),
                        wasmparser::ExternalKind::Global => ExportDesc::Global(export.index),
                        wasmparser::ExternalKind::Tag => {
                            return Err(ModuleError::Unsupported("exception-handling tags".into()))
                        }
                    };
                    parsed.exports.push(ExportEntry {
                        name: export.name.to_string(),
                        desc,
                    });
                }
            }
            wasmparser::Payload::StartSection { func, .. } => parsed.start = Some(func),
            wasmparser::Payload::ElementSection(reader) => {
                for elem in reader {
                    let elem = elem?;
                    let (table_index, offset) = match elem.kind {
                        wasmparser::ElementKind::Active { table_index, offset_expr } => {
                            (table_index.unwrap_or(0), const_expr(&offset_expr)?)
                        }
                        wasmparser::ElementKind::Passive | wasmparser::ElementKind::Declared => continue,
                    };
                    let items = match elem.items {
                        wasmparser::ElementItems::Functions(idxs) => {
                            idxs.into_iter().map(|i| i.map(Some)).collect::<Result<Vec<_>, _>>()?
                        }
                        wasmparser::ElementItems::Expressions(_, exprs) => exprs
                            .into_iter()
                            .map(|e| match const_expr(&e?)? {
                                ConstExpr::FuncRef(f) => Ok(f),
                                _ => Err(ModuleError::Unsupported("non-funcref element expression".into())),
                            })
                            .collect::<Result<Vec<_>, ModuleError>>()?,
                    };
                    parsed.elements.push(ElementSegment { table_index, offset, items });
                }
            }
            wasmparser::Payload::CodeSectionEntry(body) => {
                let mut locals = Vec::new();
                let mut locals_reader = body.get_locals_reader()?;
                for _ in 0..locals_reader.get_count() {
                    let (count, ty) = locals_reader.read()?;
                    locals.push((count, val_type(ty)?));
                }
                let mut operators = Vec::new();
                let mut ops_reader = body.get_operators_reader()?;
                while !ops_reader.eof() {
                    let (op, _offset) = ops_reader.read_with_offset()?;
                    operators.push(op.into_owned());
                }
                parsed.bodies.push(RawFunctionBody { locals, operators });
            }
            wasmparser::Payload::DataSection(reader) => {
                for data in reader {
                    let data = data?;
                    let (memory_index, offset) = match data.kind {
                        wasmparser::DataKind::Active { memory_index, offset_expr } => {
                            (memory_index, const_expr(&offset_expr)?)
                        }
                        wasmparser::DataKind::Passive => continue,
                    };
                    parsed.data.push(DataSegment {
                        memory_index,
                        offset,
                        bytes: data.data.to_vec(),
                    });
                }
            }
            wasmparser::Payload::CustomSection(reader) if reader.name() == "name" => {
                let name_reader = wasmparser::NameSectionReader::new(reader.data(), reader.data_offset());
                for name in name_reader.into_iter().flatten() {
                    if let wasmparser::Name::Function(map) = name {
                        for naming in map.into_iter().flatten() {
                            // `naming.index` is already in the module's combined
                            // import+local function space, matching `FuncIdx`.
                            parsed.function_names.insert(naming.index, naming.name.to_string());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(parsed)
}
