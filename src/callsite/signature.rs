use std::fmt;

use crate::layout::Layout;
use crate::types::{LogicalType, Value};

/// Logical parameter and return types of a native function.
///
/// A variadic signature ends with an array parameter whose element type
/// constrains the trailing arguments (use [`LogicalType::Any`] for no constraint).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionSignature {
    params: Vec<LogicalType>,
    ret: Option<LogicalType>,
    variadic: bool,
}

impl FunctionSignature {
    /// Create a fixed-arity signature; `None` return means void
    pub fn new(params: Vec<LogicalType>, ret: Option<LogicalType>) -> Self {
        Self {
            params,
            ret,
            variadic: false,
        }
    }

    /// Create a variadic signature with `fixed` leading parameters
    pub fn variadic(fixed: Vec<LogicalType>, element: LogicalType, ret: Option<LogicalType>) -> Self {
        let mut params = fixed;
        params.push(LogicalType::array_of(element));
        Self {
            params,
            ret,
            variadic: true,
        }
    }

    /// All declared parameters, the variadic array included
    pub fn params(&self) -> &[LogicalType] {
        &self.params
    }

    /// Parameters before the variadic tail
    pub fn fixed_params(&self) -> &[LogicalType] {
        if self.variadic {
            &self.params[..self.params.len() - 1]
        } else {
            &self.params
        }
    }

    /// Element type of the variadic tail
    pub fn variadic_element(&self) -> Option<&LogicalType> {
        if self.variadic {
            self.params.last().and_then(LogicalType::element)
        } else {
            None
        }
    }

    pub fn returns(&self) -> Option<&LogicalType> {
        self.ret.as_ref()
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// Validate argument count
    pub fn validate_args(&self, arg_count: usize) -> bool {
        if self.variadic {
            arg_count >= self.fixed_params().len()
        } else {
            arg_count == self.params.len()
        }
    }

    /// Check count and per-argument types against runtime values
    pub fn accepts(&self, args: &[Value]) -> bool {
        if !self.validate_args(args.len()) {
            return false;
        }
        let fixed = self.fixed_params();
        let fixed_ok = fixed.iter().zip(args).all(|(ty, value)| ty.accepts(value));
        let tail_ok = match self.variadic_element() {
            Some(element) => args[fixed.len()..].iter().all(|value| element.accepts(value)),
            None => true,
        };
        fixed_ok && tail_ok
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ret {
            Some(ret) => write!(f, "{} (", ret)?,
            None => write!(f, "void (")?,
        }
        for (i, param) in self.fixed_params().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        if let Some(element) = self.variadic_element() {
            if !self.fixed_params().is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "{}...", element)?;
        }
        write!(f, ")")
    }
}

/// Native layouts of one call: argument layouts, return layout, and for
/// variadic calls the number of fixed arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallDescriptor {
    args: Vec<Layout>,
    ret: Option<Layout>,
    fixed_args: Option<usize>,
}

impl CallDescriptor {
    pub fn new(args: Vec<Layout>, ret: Option<Layout>) -> Self {
        Self {
            args,
            ret,
            fixed_args: None,
        }
    }

    /// Copy of this descriptor with promoted variadic layouts appended
    pub fn with_variadic(&self, extra: Vec<Layout>) -> Self {
        let mut args = self.args.clone();
        let fixed = args.len();
        args.extend(extra);
        Self {
            args,
            ret: self.ret.clone(),
            fixed_args: Some(fixed),
        }
    }

    pub fn args(&self) -> &[Layout] {
        &self.args
    }

    pub fn ret(&self) -> Option<&Layout> {
        self.ret.as_ref()
    }

    pub fn is_variadic(&self) -> bool {
        self.fixed_args.is_some()
    }

    /// Number of arguments before the variadic tail
    pub fn fixed_count(&self) -> usize {
        self.fixed_args.unwrap_or(self.args.len())
    }
}

impl fmt::Display for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, layout) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if i == self.fixed_count() {
                write!(f, "...")?;
            }
            write!(f, "{}", layout)?;
        }
        match &self.ret {
            Some(ret) => write!(f, ") -> {}", ret),
            None => write!(f, ") -> void"),
        }
    }
}
