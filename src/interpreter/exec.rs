use super::Trap;
use super::ops;
use crate::func::Caller;
use crate::parse::instr::{Instruction, Load, Store};
use crate::parse::{FuncBody, ParsedModule};
use crate::types::FuncType;
use crate::{Func, Memory, Val};

/// Execution limits taken from the engine configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub(crate) max_call_depth: u32,
    pub(crate) fuel: Option<u64>,
}

/// Instance state an execution reads and writes.
pub(crate) struct Context<'a> {
    pub(crate) module: &'a ParsedModule,
    /// Imported functions, indexed by function index.
    pub(crate) host_funcs: &'a [Func],
    pub(crate) memory: Option<&'a Memory>,
    pub(crate) globals: &'a mut [Val],
}

#[derive(Clone, Copy)]
struct Label {
    /// Loop: pc of the `loop`. Block/if: pc of the matching `end`.
    target: usize,
    /// Operand stack height below the label's inputs.
    height: usize,
    /// Values carried by a branch to this label.
    arity: usize,
    is_loop: bool,
}

#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Return,
}

/// Recursive interpreter: every WASM call is a Rust call, with its own
/// locals and label stack on top of one shared operand stack.
pub(crate) struct Executor<'a> {
    module: &'a ParsedModule,
    host_funcs: &'a [Func],
    memory: Option<&'a Memory>,
    globals: &'a mut [Val],
    stack: Vec<u64>,
    depth: u32,
    limits: Limits,
}

// WASM validation guarantees the stack is non-empty at every pop site.

#[inline(always)]
fn pop_raw(stack: &mut Vec<u64>) -> u64 {
    stack.pop().unwrap()
}

#[inline(always)]
fn pop_i32(stack: &mut Vec<u64>) -> i32 {
    pop_raw(stack) as i32
}

#[inline(always)]
fn pop_i64(stack: &mut Vec<u64>) -> i64 {
    pop_raw(stack) as i64
}

#[inline(always)]
fn pop_f32(stack: &mut Vec<u64>) -> f32 {
    f32::from_bits(pop_raw(stack) as u32)
}

#[inline(always)]
fn pop_f64(stack: &mut Vec<u64>) -> f64 {
    f64::from_bits(pop_raw(stack))
}

#[inline(always)]
fn push_i32(stack: &mut Vec<u64>, v: i32) {
    stack.push(v as u32 as u64);
}

#[inline(always)]
fn push_bool(stack: &mut Vec<u64>, v: bool) {
    stack.push(v as u64);
}

/// Truncate stack to `height`, preserving the top `arity` values.
#[inline(always)]
fn stack_unwind(stack: &mut Vec<u64>, height: usize, arity: usize) {
    if arity == 0 {
        stack.truncate(height);
    } else if stack.len() - arity > height {
        let src = stack.len() - arity;
        stack.copy_within(src.., height);
        stack.truncate(height + arity);
    }
}

/// Constants and numeric operators. Kept out of line so the recursive
/// `execute` frame stays small.
#[inline(never)]
fn exec_numeric(stack: &mut Vec<u64>, instr: &Instruction) -> Result<(), Trap> {
    match instr {
        // --- Constants ---
        Instruction::I32Const(v) => push_i32(stack, *v),
        Instruction::I64Const(v) => stack.push(*v as u64),
        Instruction::F32Const(bits) => stack.push(*bits as u64),
        Instruction::F64Const(bits) => stack.push(*bits),

        // --- Numeric ---
        Instruction::I32Eqz => {
            let a = pop_i32(stack);
            push_bool(stack, a == 0);
        }
        Instruction::I64Eqz => {
            let a = pop_i64(stack);
            push_bool(stack, a == 0);
        }
        Instruction::I32Compare(op) => {
            let b = pop_i32(stack);
            let a = pop_i32(stack);
            push_bool(stack, ops::i32_compare(*op, a, b));
        }
        Instruction::I64Compare(op) => {
            let b = pop_i64(stack);
            let a = pop_i64(stack);
            push_bool(stack, ops::i64_compare(*op, a, b));
        }
        Instruction::F32Compare(op) => {
            let b = pop_f32(stack);
            let a = pop_f32(stack);
            push_bool(stack, ops::f32_compare(*op, a, b));
        }
        Instruction::F64Compare(op) => {
            let b = pop_f64(stack);
            let a = pop_f64(stack);
            push_bool(stack, ops::f64_compare(*op, a, b));
        }
        Instruction::I32Unary(op) => {
            let a = pop_i32(stack);
            push_i32(stack, ops::i32_unary(*op, a));
        }
        Instruction::I64Unary(op) => {
            let a = pop_i64(stack);
            stack.push(ops::i64_unary(*op, a) as u64);
        }
        Instruction::I32Binary(op) => {
            let b = pop_i32(stack);
            let a = pop_i32(stack);
            push_i32(stack, ops::i32_binary(*op, a, b)?);
        }
        Instruction::I64Binary(op) => {
            let b = pop_i64(stack);
            let a = pop_i64(stack);
            stack.push(ops::i64_binary(*op, a, b)? as u64);
        }
        Instruction::F32Unary(op) => {
            let a = pop_f32(stack);
            stack.push(ops::f32_unary(*op, a).to_bits() as u64);
        }
        Instruction::F64Unary(op) => {
            let a = pop_f64(stack);
            stack.push(ops::f64_unary(*op, a).to_bits());
        }
        Instruction::F32Binary(op) => {
            let b = pop_f32(stack);
            let a = pop_f32(stack);
            stack.push(ops::f32_binary(*op, a, b).to_bits() as u64);
        }
        Instruction::F64Binary(op) => {
            let b = pop_f64(stack);
            let a = pop_f64(stack);
            stack.push(ops::f64_binary(*op, a, b).to_bits());
        }
        Instruction::Convert(op) => {
            let a = pop_raw(stack);
            stack.push(ops::convert(*op, a)?);
        }
        _ => unreachable!("control instruction {instr:?} dispatched as numeric"),
    }
    Ok(())
}

impl<'a> Executor<'a> {
    pub(crate) fn new(ctx: Context<'a>, limits: Limits) -> Self {
        Self {
            module: ctx.module,
            host_funcs: ctx.host_funcs,
            memory: ctx.memory,
            globals: ctx.globals,
            stack: Vec::with_capacity(256),
            depth: 0,
            limits,
        }
    }

    /// Call `func_idx` with already type-checked arguments.
    pub(crate) fn invoke(&mut self, func_idx: u32, args: &[Val]) -> Result<Vec<Val>, Trap> {
        let ty = self.func_type(func_idx)?;
        self.stack.clear();
        self.stack.extend(args.iter().map(|arg| arg.to_bits()));

        self.call(func_idx)?;

        let base = self.stack.len() - ty.results().len();
        let results = self.stack[base..]
            .iter()
            .zip(ty.results())
            .map(|(bits, ty)| Val::from_bits(*bits, *ty))
            .collect();
        self.stack.truncate(base);
        Ok(results)
    }

    fn func_type(&self, func_idx: u32) -> Result<&'a FuncType, Trap> {
        let module = self.module;
        module
            .func_type(func_idx)
            .ok_or_else(|| Trap::Host(format!("function {func_idx} not found")))
    }

    fn call(&mut self, func_idx: u32) -> Result<(), Trap> {
        let module = self.module;
        let ty = self.func_type(func_idx)?;
        if func_idx < module.num_func_imports {
            return self.call_host(func_idx, ty);
        }
        let body = module
            .body(func_idx)
            .ok_or_else(|| Trap::Host(format!("function {func_idx} has no body")))?;

        if self.depth >= self.limits.max_call_depth {
            return Err(Trap::CallStackExhausted);
        }
        self.depth += 1;
        let result = self.execute(body, ty.params().len(), ty.results().len());
        self.depth -= 1;
        result
    }

    fn call_host(&mut self, func_idx: u32, ty: &FuncType) -> Result<(), Trap> {
        let host_funcs = self.host_funcs;
        let func = host_funcs
            .get(func_idx as usize)
            .ok_or_else(|| Trap::Host(format!("unresolved import function {func_idx}")))?;

        let base = self.stack.len() - ty.params().len();
        let args: Vec<Val> = self.stack[base..]
            .iter()
            .zip(ty.params())
            .map(|(bits, ty)| Val::from_bits(*bits, *ty))
            .collect();
        self.stack.truncate(base);

        let mut caller = Caller::new(self.memory);
        let results = func.call(&mut caller, &args)?;
        self.stack.extend(results.iter().map(|val| val.to_bits()));
        Ok(())
    }

    #[inline]
    fn consume_fuel(&mut self) -> Result<(), Trap> {
        if let Some(fuel) = &mut self.limits.fuel {
            if *fuel == 0 {
                return Err(Trap::OutOfFuel);
            }
            *fuel -= 1;
        }
        Ok(())
    }

    fn memory(&self) -> Result<&'a Memory, Trap> {
        self.memory.ok_or(Trap::MemoryOutOfBounds)
    }

    /// Branch to the label `depth` levels up. Branching past the
    /// outermost label returns from the function.
    fn branch(&mut self, labels: &mut Vec<Label>, depth: u32, pc: &mut usize) -> Flow {
        let depth = depth as usize;
        if depth >= labels.len() {
            return Flow::Return;
        }
        let idx = labels.len() - 1 - depth;
        let label = labels[idx];
        stack_unwind(&mut self.stack, label.height, label.arity);
        *pc = label.target + 1;
        if label.is_loop {
            labels.truncate(idx + 1);
        } else {
            labels.truncate(idx);
        }
        Flow::Continue
    }

    fn execute(
        &mut self,
        func: &'a FuncBody,
        param_count: usize,
        arity: usize,
    ) -> Result<(), Trap> {
        let base = self.stack.len() - param_count;
        let mut locals: Vec<u64> = Vec::with_capacity(func.locals.len());
        locals.extend_from_slice(&self.stack[base..]);
        locals.resize(func.locals.len(), 0);
        self.stack.truncate(base);

        let code = &func.code;
        let mut labels: Vec<Label> = Vec::new();
        let mut pc = 0;

        while pc < code.len() {
            self.consume_fuel()?;
            let instr = &code[pc];
            pc += 1;

            let stack = &mut self.stack;
            match instr {
                Instruction::Unreachable => return Err(Trap::Unreachable),
                Instruction::Nop => {}

                // --- Control flow ---
                Instruction::Block {
                    params,
                    results,
                    end,
                } => labels.push(Label {
                    target: *end,
                    height: stack.len() - *params as usize,
                    arity: *results as usize,
                    is_loop: false,
                }),
                Instruction::Loop { params } => labels.push(Label {
                    target: pc - 1,
                    height: stack.len() - *params as usize,
                    arity: *params as usize,
                    is_loop: true,
                }),
                Instruction::If {
                    params,
                    results,
                    else_pc,
                    end,
                } => {
                    let cond = pop_i32(stack);
                    labels.push(Label {
                        target: *end,
                        height: stack.len() - *params as usize,
                        arity: *results as usize,
                        is_loop: false,
                    });
                    if cond == 0 {
                        // Without an else arm the `end` pops the label.
                        pc = match else_pc {
                            Some(else_pc) => else_pc + 1,
                            None => *end,
                        };
                    }
                }
                Instruction::Else => {
                    // End of the then arm: skip to the matching `end`.
                    if let Some(label) = labels.last() {
                        pc = label.target;
                    }
                }
                Instruction::End => {
                    if labels.pop().is_none() {
                        break;
                    }
                }
                Instruction::Br(depth) => {
                    if self.branch(&mut labels, *depth, &mut pc) == Flow::Return {
                        break;
                    }
                }
                Instruction::BrIf(depth) => {
                    let taken = pop_i32(stack) != 0;
                    if taken && self.branch(&mut labels, *depth, &mut pc) == Flow::Return {
                        break;
                    }
                }
                Instruction::BrTable { targets, default } => {
                    let idx = pop_i32(stack) as u32 as usize;
                    let depth = targets.get(idx).copied().unwrap_or(*default);
                    if self.branch(&mut labels, depth, &mut pc) == Flow::Return {
                        break;
                    }
                }
                Instruction::Return => break,
                Instruction::Call(idx) => self.call(*idx)?,
                Instruction::Drop => {
                    pop_raw(stack);
                }
                Instruction::Select => {
                    let cond = pop_i32(stack);
                    let b = pop_raw(stack);
                    let a = pop_raw(stack);
                    stack.push(if cond != 0 { a } else { b });
                }

                // --- Locals / Globals ---
                Instruction::LocalGet(idx) => stack.push(locals[*idx as usize]),
                Instruction::LocalSet(idx) => locals[*idx as usize] = pop_raw(stack),
                Instruction::LocalTee(idx) => {
                    locals[*idx as usize] = *stack.last().unwrap();
                }
                Instruction::GlobalGet(idx) => stack.push(self.globals[*idx as usize].to_bits()),
                Instruction::GlobalSet(idx) => {
                    let ty = self.module.global_types[*idx as usize].content;
                    self.globals[*idx as usize] = Val::from_bits(pop_raw(stack), ty);
                }

                // --- Memory ---
                Instruction::Load(kind, offset) => {
                    let addr = pop_i32(stack) as u32 as u64 + offset;
                    let value = self.load(*kind, addr)?;
                    self.stack.push(value);
                }
                Instruction::Store(kind, offset) => {
                    let value = pop_raw(stack);
                    let addr = pop_i32(stack) as u32 as u64 + offset;
                    self.store(*kind, addr, value)?;
                }
                Instruction::MemorySize => {
                    let pages = self.memory()?.size();
                    push_i32(&mut self.stack, pages as i32);
                }
                Instruction::MemoryGrow => {
                    let delta = pop_i32(stack) as u32;
                    let old = self.memory()?.grow(delta).map_or(-1, |old| old as i32);
                    push_i32(&mut self.stack, old);
                }

                numeric => exec_numeric(stack, numeric)?,
            }
        }

        stack_unwind(&mut self.stack, base, arity);
        Ok(())
    }

    fn load(&self, kind: Load, addr: u64) -> Result<u64, Trap> {
        let mem = self.memory()?;
        Ok(match kind {
            Load::I32 | Load::F32 | Load::I64U32 => u32::from_le_bytes(mem.load(addr)?) as u64,
            Load::I64 | Load::F64 => u64::from_le_bytes(mem.load(addr)?),
            Load::I32S8 => i8::from_le_bytes(mem.load(addr)?) as i32 as u32 as u64,
            Load::I32U8 | Load::I64U8 => u8::from_le_bytes(mem.load(addr)?) as u64,
            Load::I32S16 => i16::from_le_bytes(mem.load(addr)?) as i32 as u32 as u64,
            Load::I32U16 | Load::I64U16 => u16::from_le_bytes(mem.load(addr)?) as u64,
            Load::I64S8 => i8::from_le_bytes(mem.load(addr)?) as i64 as u64,
            Load::I64S16 => i16::from_le_bytes(mem.load(addr)?) as i64 as u64,
            Load::I64S32 => i32::from_le_bytes(mem.load(addr)?) as i64 as u64,
        })
    }

    fn store(&self, kind: Store, addr: u64, value: u64) -> Result<(), Trap> {
        let mem = self.memory()?;
        match kind {
            Store::I32 | Store::F32 | Store::I64To32 => {
                mem.store(addr, &(value as u32).to_le_bytes())
            }
            Store::I64 | Store::F64 => mem.store(addr, &value.to_le_bytes()),
            Store::I32To8 | Store::I64To8 => mem.store(addr, &(value as u8).to_le_bytes()),
            Store::I32To16 | Store::I64To16 => mem.store(addr, &(value as u16).to_le_bytes()),
        }
    }
}
