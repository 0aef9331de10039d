use wasmparser::{BlockType, Operator};

use crate::Error;
use crate::types::FuncType;

/// Our own instruction form, decoded from wasmparser's `Operator` once at
/// parse time so execution never re-reads the binary.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Instruction {
    // Control
    Unreachable,
    Nop,
    Block {
        params: u32,
        results: u32,
        end: usize,
    },
    Loop { params: u32 },
    If {
        params: u32,
        results: u32,
        else_pc: Option<usize>,
        end: usize,
    },
    Else,
    End,
    Br(u32),
    BrIf(u32),
    BrTable { targets: Box<[u32]>, default: u32 },
    Return,
    Call(u32),
    Drop,
    Select,

    // Locals / Globals
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    // Memory (alignment is a hint and is not stored)
    Load(Load, u64),
    Store(Store, u64),
    MemorySize,
    MemoryGrow,

    // Constants (floats carried as raw bits)
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),

    // Numeric
    I32Eqz,
    I64Eqz,
    I32Compare(IntCompare),
    I64Compare(IntCompare),
    F32Compare(FloatCompare),
    F64Compare(FloatCompare),
    I32Unary(IntUnary),
    I64Unary(IntUnary),
    I32Binary(IntBinary),
    I64Binary(IntBinary),
    F32Unary(FloatUnary),
    F64Unary(FloatUnary),
    F32Binary(FloatBinary),
    F64Binary(FloatBinary),
    Convert(Conversion),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Load {
    I32,
    I64,
    F32,
    F64,
    I32S8,
    I32U8,
    I32S16,
    I32U16,
    I64S8,
    I64U8,
    I64S16,
    I64U16,
    I64S32,
    I64U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Store {
    I32,
    I64,
    F32,
    F64,
    I32To8,
    I32To16,
    I64To8,
    I64To16,
    I64To32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntCompare {
    Eq,
    Ne,
    LtS,
    LtU,
    GtS,
    GtU,
    LeS,
    LeU,
    GeS,
    GeU,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FloatCompare {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntUnary {
    Clz,
    Ctz,
    Popcnt,
    Extend8S,
    Extend16S,
    Extend32S,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntBinary {
    Add,
    Sub,
    Mul,
    DivS,
    DivU,
    RemS,
    RemU,
    And,
    Or,
    Xor,
    Shl,
    ShrS,
    ShrU,
    Rotl,
    Rotr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FloatUnary {
    Abs,
    Neg,
    Ceil,
    Floor,
    Trunc,
    Nearest,
    Sqrt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FloatBinary {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    Copysign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Conversion {
    I32WrapI64,
    I64ExtendI32S,
    I64ExtendI32U,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F32DemoteF64,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,
}

/// Number of (params, results) a block type carries.
fn block_arity(ty: BlockType, types: &[FuncType]) -> Result<(u32, u32), Error> {
    match ty {
        BlockType::Empty => Ok((0, 0)),
        BlockType::Type(_) => Ok((0, 1)),
        BlockType::FuncType(idx) => {
            let ty = types
                .get(idx as usize)
                .ok_or_else(|| Error::Compile(format!("block type {idx} out of bounds")))?;
            Ok((ty.params().len() as u32, ty.results().len() as u32))
        }
    }
}

pub(crate) fn decode_op(op: &Operator, types: &[FuncType]) -> Result<Instruction, Error> {
    use Instruction as I;

    Ok(match *op {
        Operator::Unreachable => I::Unreachable,
        Operator::Nop => I::Nop,
        Operator::Block { blockty } => {
            let (params, results) = block_arity(blockty, types)?;
            I::Block {
                params,
                results,
                end: 0,
            }
        }
        Operator::Loop { blockty } => {
            let (params, _) = block_arity(blockty, types)?;
            I::Loop { params }
        }
        Operator::If { blockty } => {
            let (params, results) = block_arity(blockty, types)?;
            I::If {
                params,
                results,
                else_pc: None,
                end: 0,
            }
        }
        Operator::Else => I::Else,
        Operator::End => I::End,
        Operator::Br { relative_depth } => I::Br(relative_depth),
        Operator::BrIf { relative_depth } => I::BrIf(relative_depth),
        Operator::BrTable { ref targets } => I::BrTable {
            targets: targets.targets().collect::<Result<_, _>>()?,
            default: targets.default(),
        },
        Operator::Return => I::Return,
        Operator::Call { function_index } => I::Call(function_index),
        Operator::Drop => I::Drop,
        Operator::Select | Operator::TypedSelect { .. } => I::Select,

        Operator::LocalGet { local_index } => I::LocalGet(local_index),
        Operator::LocalSet { local_index } => I::LocalSet(local_index),
        Operator::LocalTee { local_index } => I::LocalTee(local_index),
        Operator::GlobalGet { global_index } => I::GlobalGet(global_index),
        Operator::GlobalSet { global_index } => I::GlobalSet(global_index),

        Operator::I32Load { memarg } => I::Load(Load::I32, memarg.offset),
        Operator::I64Load { memarg } => I::Load(Load::I64, memarg.offset),
        Operator::F32Load { memarg } => I::Load(Load::F32, memarg.offset),
        Operator::F64Load { memarg } => I::Load(Load::F64, memarg.offset),
        Operator::I32Load8S { memarg } => I::Load(Load::I32S8, memarg.offset),
        Operator::I32Load8U { memarg } => I::Load(Load::I32U8, memarg.offset),
        Operator::I32Load16S { memarg } => I::Load(Load::I32S16, memarg.offset),
        Operator::I32Load16U { memarg } => I::Load(Load::I32U16, memarg.offset),
        Operator::I64Load8S { memarg } => I::Load(Load::I64S8, memarg.offset),
        Operator::I64Load8U { memarg } => I::Load(Load::I64U8, memarg.offset),
        Operator::I64Load16S { memarg } => I::Load(Load::I64S16, memarg.offset),
        Operator::I64Load16U { memarg } => I::Load(Load::I64U16, memarg.offset),
        Operator::I64Load32S { memarg } => I::Load(Load::I64S32, memarg.offset),
        Operator::I64Load32U { memarg } => I::Load(Load::I64U32, memarg.offset),
        Operator::I32Store { memarg } => I::Store(Store::I32, memarg.offset),
        Operator::I64Store { memarg } => I::Store(Store::I64, memarg.offset),
        Operator::F32Store { memarg } => I::Store(Store::F32, memarg.offset),
        Operator::F64Store { memarg } => I::Store(Store::F64, memarg.offset),
        Operator::I32Store8 { memarg } => I::Store(Store::I32To8, memarg.offset),
        Operator::I32Store16 { memarg } => I::Store(Store::I32To16, memarg.offset),
        Operator::I64Store8 { memarg } => I::Store(Store::I64To8, memarg.offset),
        Operator::I64Store16 { memarg } => I::Store(Store::I64To16, memarg.offset),
        Operator::I64Store32 { memarg } => I::Store(Store::I64To32, memarg.offset),
        Operator::MemorySize { .. } => I::MemorySize,
        Operator::MemoryGrow { .. } => I::MemoryGrow,

        Operator::I32Const { value } => I::I32Const(value),
        Operator::I64Const { value } => I::I64Const(value),
        Operator::F32Const { value } => I::F32Const(value.bits()),
        Operator::F64Const { value } => I::F64Const(value.bits()),

        Operator::I32Eqz => I::I32Eqz,
        Operator::I32Eq => I::I32Compare(IntCompare::Eq),
        Operator::I32Ne => I::I32Compare(IntCompare::Ne),
        Operator::I32LtS => I::I32Compare(IntCompare::LtS),
        Operator::I32LtU => I::I32Compare(IntCompare::LtU),
        Operator::I32GtS => I::I32Compare(IntCompare::GtS),
        Operator::I32GtU => I::I32Compare(IntCompare::GtU),
        Operator::I32LeS => I::I32Compare(IntCompare::LeS),
        Operator::I32LeU => I::I32Compare(IntCompare::LeU),
        Operator::I32GeS => I::I32Compare(IntCompare::GeS),
        Operator::I32GeU => I::I32Compare(IntCompare::GeU),
        Operator::I64Eqz => I::I64Eqz,
        Operator::I64Eq => I::I64Compare(IntCompare::Eq),
        Operator::I64Ne => I::I64Compare(IntCompare::Ne),
        Operator::I64LtS => I::I64Compare(IntCompare::LtS),
        Operator::I64LtU => I::I64Compare(IntCompare::LtU),
        Operator::I64GtS => I::I64Compare(IntCompare::GtS),
        Operator::I64GtU => I::I64Compare(IntCompare::GtU),
        Operator::I64LeS => I::I64Compare(IntCompare::LeS),
        Operator::I64LeU => I::I64Compare(IntCompare::LeU),
        Operator::I64GeS => I::I64Compare(IntCompare::GeS),
        Operator::I64GeU => I::I64Compare(IntCompare::GeU),
        Operator::F32Eq => I::F32Compare(FloatCompare::Eq),
        Operator::F32Ne => I::F32Compare(FloatCompare::Ne),
        Operator::F32Lt => I::F32Compare(FloatCompare::Lt),
        Operator::F32Gt => I::F32Compare(FloatCompare::Gt),
        Operator::F32Le => I::F32Compare(FloatCompare::Le),
        Operator::F32Ge => I::F32Compare(FloatCompare::Ge),
        Operator::F64Eq => I::F64Compare(FloatCompare::Eq),
        Operator::F64Ne => I::F64Compare(FloatCompare::Ne),
        Operator::F64Lt => I::F64Compare(FloatCompare::Lt),
        Operator::F64Gt => I::F64Compare(FloatCompare::Gt),
        Operator::F64Le => I::F64Compare(FloatCompare::Le),
        Operator::F64Ge => I::F64Compare(FloatCompare::Ge),

        Operator::I32Clz => I::I32Unary(IntUnary::Clz),
        Operator::I32Ctz => I::I32Unary(IntUnary::Ctz),
        Operator::I32Popcnt => I::I32Unary(IntUnary::Popcnt),
        Operator::I32Extend8S => I::I32Unary(IntUnary::Extend8S),
        Operator::I32Extend16S => I::I32Unary(IntUnary::Extend16S),
        Operator::I64Clz => I::I64Unary(IntUnary::Clz),
        Operator::I64Ctz => I::I64Unary(IntUnary::Ctz),
        Operator::I64Popcnt => I::I64Unary(IntUnary::Popcnt),
        Operator::I64Extend8S => I::I64Unary(IntUnary::Extend8S),
        Operator::I64Extend16S => I::I64Unary(IntUnary::Extend16S),
        Operator::I64Extend32S => I::I64Unary(IntUnary::Extend32S),

        Operator::I32Add => I::I32Binary(IntBinary::Add),
        Operator::I32Sub => I::I32Binary(IntBinary::Sub),
        Operator::I32Mul => I::I32Binary(IntBinary::Mul),
        Operator::I32DivS => I::I32Binary(IntBinary::DivS),
        Operator::I32DivU => I::I32Binary(IntBinary::DivU),
        Operator::I32RemS => I::I32Binary(IntBinary::RemS),
        Operator::I32RemU => I::I32Binary(IntBinary::RemU),
        Operator::I32And => I::I32Binary(IntBinary::And),
        Operator::I32Or => I::I32Binary(IntBinary::Or),
        Operator::I32Xor => I::I32Binary(IntBinary::Xor),
        Operator::I32Shl => I::I32Binary(IntBinary::Shl),
        Operator::I32ShrS => I::I32Binary(IntBinary::ShrS),
        Operator::I32ShrU => I::I32Binary(IntBinary::ShrU),
        Operator::I32Rotl => I::I32Binary(IntBinary::Rotl),
        Operator::I32Rotr => I::I32Binary(IntBinary::Rotr),
        Operator::I64Add => I::I64Binary(IntBinary::Add),
        Operator::I64Sub => I::I64Binary(IntBinary::Sub),
        Operator::I64Mul => I::I64Binary(IntBinary::Mul),
        Operator::I64DivS => I::I64Binary(IntBinary::DivS),
        Operator::I64DivU => I::I64Binary(IntBinary::DivU),
        Operator::I64RemS => I::I64Binary(IntBinary::RemS),
        Operator::I64RemU => I::I64Binary(IntBinary::RemU),
        Operator::I64And => I::I64Binary(IntBinary::And),
        Operator::I64Or => I::I64Binary(IntBinary::Or),
        Operator::I64Xor => I::I64Binary(IntBinary::Xor),
        Operator::I64Shl => I::I64Binary(IntBinary::Shl),
        Operator::I64ShrS => I::I64Binary(IntBinary::ShrS),
        Operator::I64ShrU => I::I64Binary(IntBinary::ShrU),
        Operator::I64Rotl => I::I64Binary(IntBinary::Rotl),
        Operator::I64Rotr => I::I64Binary(IntBinary::Rotr),

        Operator::F32Abs => I::F32Unary(FloatUnary::Abs),
        Operator::F32Neg => I::F32Unary(FloatUnary::Neg),
        Operator::F32Ceil => I::F32Unary(FloatUnary::Ceil),
        Operator::F32Floor => I::F32Unary(FloatUnary::Floor),
        Operator::F32Trunc => I::F32Unary(FloatUnary::Trunc),
        Operator::F32Nearest => I::F32Unary(FloatUnary::Nearest),
        Operator::F32Sqrt => I::F32Unary(FloatUnary::Sqrt),
        Operator::F64Abs => I::F64Unary(FloatUnary::Abs),
        Operator::F64Neg => I::F64Unary(FloatUnary::Neg),
        Operator::F64Ceil => I::F64Unary(FloatUnary::Ceil),
        Operator::F64Floor => I::F64Unary(FloatUnary::Floor),
        Operator::F64Trunc => I::F64Unary(FloatUnary::Trunc),
        Operator::F64Nearest => I::F64Unary(FloatUnary::Nearest),
        Operator::F64Sqrt => I::F64Unary(FloatUnary::Sqrt),

        Operator::F32Add => I::F32Binary(FloatBinary::Add),
        Operator::F32Sub => I::F32Binary(FloatBinary::Sub),
        Operator::F32Mul => I::F32Binary(FloatBinary::Mul),
        Operator::F32Div => I::F32Binary(FloatBinary::Div),
        Operator::F32Min => I::F32Binary(FloatBinary::Min),
        Operator::F32Max => I::F32Binary(FloatBinary::Max),
        Operator::F32Copysign => I::F32Binary(FloatBinary::Copysign),
        Operator::F64Add => I::F64Binary(FloatBinary::Add),
        Operator::F64Sub => I::F64Binary(FloatBinary::Sub),
        Operator::F64Mul => I::F64Binary(FloatBinary::Mul),
        Operator::F64Div => I::F64Binary(FloatBinary::Div),
        Operator::F64Min => I::F64Binary(FloatBinary::Min),
        Operator::F64Max => I::F64Binary(FloatBinary::Max),
        Operator::F64Copysign => I::F64Binary(FloatBinary::Copysign),

        Operator::I32WrapI64 => I::Convert(Conversion::I32WrapI64),
        Operator::I64ExtendI32S => I::Convert(Conversion::I64ExtendI32S),
        Operator::I64ExtendI32U => I::Convert(Conversion::I64ExtendI32U),
        Operator::I32TruncF32S => I::Convert(Conversion::I32TruncF32S),
        Operator::I32TruncF32U => I::Convert(Conversion::I32TruncF32U),
        Operator::I32TruncF64S => I::Convert(Conversion::I32TruncF64S),
        Operator::I32TruncF64U => I::Convert(Conversion::I32TruncF64U),
        Operator::I64TruncF32S => I::Convert(Conversion::I64TruncF32S),
        Operator::I64TruncF32U => I::Convert(Conversion::I64TruncF32U),
        Operator::I64TruncF64S => I::Convert(Conversion::I64TruncF64S),
        Operator::I64TruncF64U => I::Convert(Conversion::I64TruncF64U),
        Operator::F32ConvertI32S => I::Convert(Conversion::F32ConvertI32S),
        Operator::F32ConvertI32U => I::Convert(Conversion::F32ConvertI32U),
        Operator::F32ConvertI64S => I::Convert(Conversion::F32ConvertI64S),
        Operator::F32ConvertI64U => I::Convert(Conversion::F32ConvertI64U),
        Operator::F64ConvertI32S => I::Convert(Conversion::F64ConvertI32S),
        Operator::F64ConvertI32U => I::Convert(Conversion::F64ConvertI32U),
        Operator::F64ConvertI64S => I::Convert(Conversion::F64ConvertI64S),
        Operator::F64ConvertI64U => I::Convert(Conversion::F64ConvertI64U),
        Operator::F32DemoteF64 => I::Convert(Conversion::F32DemoteF64),
        Operator::F64PromoteF32 => I::Convert(Conversion::F64PromoteF32),
        Operator::I32ReinterpretF32 => I::Convert(Conversion::I32ReinterpretF32),
        Operator::I64ReinterpretF64 => I::Convert(Conversion::I64ReinterpretF64),
        Operator::F32ReinterpretI32 => I::Convert(Conversion::F32ReinterpretI32),
        Operator::F64ReinterpretI64 => I::Convert(Conversion::F64ReinterpretI64),

        ref other => {
            return Err(Error::Compile(format!(
                "unsupported instruction {}",
                operator_name(other)
            )));
        }
    })
}

/// Variant name of an operator, without its immediates.
fn operator_name(op: &Operator) -> String {
    let text = format!("{op:?}");
    text.split([' ', '{', '('])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Fill in `end`/`else_pc` for Block and If instructions.
pub(crate) fn resolve_block_targets(body: &mut [Instruction]) {
    // Open blocks: (start pc, else pc)
    let mut open: Vec<(usize, Option<usize>)> = Vec::new();

    for i in 0..body.len() {
        match body[i] {
            Instruction::Block { .. } | Instruction::Loop { .. } | Instruction::If { .. } => {
                open.push((i, None));
            }
            Instruction::Else => {
                if let Some(top) = open.last_mut() {
                    top.1 = Some(i);
                }
            }
            Instruction::End => {
                let Some((start, else_at)) = open.pop() else {
                    continue; // function body end
                };
                match &mut body[start] {
                    Instruction::Block { end, .. } => *end = i,
                    Instruction::If { end, else_pc, .. } => {
                        *end = i;
                        *else_pc = else_at;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_targets_point_at_matching_end() {
        let mut body = vec![
            Instruction::Block {
                params: 0,
                results: 0,
                end: 0,
            },
            Instruction::I32Const(1),
            Instruction::If {
                params: 0,
                results: 0,
                else_pc: None,
                end: 0,
            },
            Instruction::Nop,
            Instruction::Else,
            Instruction::Nop,
            Instruction::End,
            Instruction::End,
            Instruction::End,
        ];
        resolve_block_targets(&mut body);
        assert_eq!(
            body[0],
            Instruction::Block {
                params: 0,
                results: 0,
                end: 7,
            }
        );
        assert_eq!(
            body[2],
            Instruction::If {
                params: 0,
                results: 0,
                else_pc: Some(4),
                end: 6,
            }
        );
    }

    #[test]
    fn operator_name_strips_immediates() {
        let op = Operator::CallIndirect {
            type_index: 0,
            table_index: 0,
        };
        assert_eq!(operator_name(&op), "CallIndirect");
        assert_eq!(operator_name(&Operator::Nop), "Nop");
    }
}
