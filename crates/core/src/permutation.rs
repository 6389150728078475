//! Specializations of a parameter list over its optional by-reference
//! parameters.
//!
//! Each optional by-reference parameter is either *present*, and passed as a
//! reference to the underlying value, or *absent*, and passed as a null
//! pointer. A method with `k` such parameters has `2^k` permutations. Bit `i`
//! of a permutation index is the presence flag of the `i`-th optional
//! by-reference parameter, counting from the least significant bit.

use crate::descriptor::{MethodDescriptor, ParameterDescriptor};
use crate::error::{Error, Result};
use crate::types::TypeDesc;

/// Upper bound on optional by-reference parameters of a single method.
pub const MAX_OPTIONAL_REFERENCES: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct Permutation {
    pub index: usize,
    pub params: Vec<ParameterDescriptor>,
}

/// Positions of the optional by-reference parameters, in declaration order.
pub fn optional_ref_positions(method: &MethodDescriptor) -> Vec<usize> {
    method
        .params
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_optional_ref())
        .map(|(i, _)| i)
        .collect()
}

/// Enumerates every permutation of `method`'s parameter list, ordered by index.
pub fn generate(method: &MethodDescriptor) -> Result<Vec<Permutation>> {
    let positions = optional_ref_positions(method);
    if positions.len() > MAX_OPTIONAL_REFERENCES {
        return Err(Error::TooManyOptionalReferences {
            member: method.name.clone(),
            count: positions.len(),
            max: MAX_OPTIONAL_REFERENCES,
        });
    }
    let mut permutations = Vec::with_capacity(1 << positions.len());
    for index in 0..1usize << positions.len() {
        let mut params = method.params.clone();
        for (bit, &pos) in positions.iter().enumerate() {
            let param = &method.params[pos];
            params[pos] = match &param.ty {
                TypeDesc::Optional(inner) if index & (1 << bit) != 0 => {
                    param.retyped((**inner).clone(), true)
                }
                _ => param.retyped(TypeDesc::Pointer, false),
            };
        }
        permutations.push(Permutation { index, params });
    }
    Ok(permutations)
}

/// Packs presence flags into a permutation index.
pub fn permutation_index(flags: impl IntoIterator<Item = bool>) -> usize {
    flags
        .into_iter()
        .enumerate()
        .fold(0, |acc, (bit, present)| acc | (usize::from(present) << bit))
}
