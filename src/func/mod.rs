//! Host functions supplied through a [`Linker`](crate::Linker).

use std::fmt;
use std::rc::Rc;

use crate::interpreter::Trap;
use crate::types::{FuncType, TypeList};
use crate::{Memory, Val};

/// Context handed to a host function while it runs inside a call.
pub struct Caller<'a> {
    memory: Option<&'a Memory>,
}

impl<'a> Caller<'a> {
    pub(crate) fn new(memory: Option<&'a Memory>) -> Self {
        Self { memory }
    }

    /// The calling instance's linear memory, imported or defined.
    pub fn memory(&self) -> Option<&'a Memory> {
        self.memory
    }
}

type HostFn = dyn Fn(&mut Caller<'_>, &[Val]) -> Result<Vec<Val>, Trap>;

/// A host function with a declared signature.
#[derive(Clone)]
pub struct Func {
    ty: FuncType,
    host: Rc<HostFn>,
}

impl Func {
    pub fn new(
        ty: FuncType,
        host: impl Fn(&mut Caller<'_>, &[Val]) -> Result<Vec<Val>, Trap> + 'static,
    ) -> Self {
        Self {
            ty,
            host: Rc::new(host),
        }
    }

    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    /// Invoke the host closure. Arguments are assumed to match the
    /// signature; results are checked against it.
    pub(crate) fn call(&self, caller: &mut Caller<'_>, args: &[Val]) -> Result<Vec<Val>, Trap> {
        let results = (self.host)(caller, args)?;
        let matches = results.len() == self.ty.results().len()
            && results
                .iter()
                .zip(self.ty.results())
                .all(|(val, ty)| val.ty() == *ty);
        if !matches {
            let got: Vec<_> = results.iter().map(Val::ty).collect();
            return Err(Trap::Host(format!(
                "host function returned {}, expected {}",
                TypeList(&got),
                TypeList(self.ty.results())
            )));
        }
        Ok(results)
    }
}

impl fmt::Debug for Func {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Func").field("ty", &self.ty).finish()
    }
}
