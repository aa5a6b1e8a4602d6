//! `concat_where`: picks, along the single dimension of a mask, segments of one of two
//! fields and stitches them into one contiguous field.

use itertools::Itertools;
use tracing::debug;

use crate::array::ArrayData;
use crate::backend::common_backend;
use crate::domain::{promote_dims, restrict_to_intersection, Dimension, Domain, UnitRange};
use crate::error::{FieldError, Result};
use crate::field::{Field, Operand};

/// Domain covered by consecutive domains along `dim`. Each domain must start where the
/// previous one stops.
pub fn stack_domains(domains: &[Domain], dim: &Dimension) -> Result<Domain> {
    let (first, last) = match (domains.first(), domains.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(FieldError::invalid("no domains to stack")),
    };
    let range_of = |d: &Domain| {
        d.get(dim)
            .map(|nr| nr.range)
            .ok_or_else(|| FieldError::dims(format!("domain {} has no dimension '{}'", d, dim)))
    };
    for (prev, next) in domains.iter().tuple_windows() {
        let (p, n) = (range_of(prev)?, range_of(next)?);
        if p.stop() != n.start() {
            return Err(FieldError::NonContiguousDomain(format!(
                "cannot stack {} after {} along '{}'",
                n, p, dim.value
            )));
        }
    }
    let range = UnitRange::from_bounds(range_of(first)?.start(), range_of(last)?.stop())?;
    first.replace_dim(dim, range)
}

fn to_field(value: Operand, mask: &Field, dims: &[Dimension]) -> Result<Field> {
    match value {
        Operand::Field(f) => f.broadcast(dims),
        Operand::Scalar(s) => Field::scalar(mask.backend(), s).broadcast(dims),
    }
}

/// Materializes unit axes over finite ranges so segments agree in shape.
fn expand_to_domain(field: &Field) -> Result<ArrayData> {
    let target: Vec<usize> = field.domain().ranges().map(|r| r.len().unwrap_or(1)).collect();
    if field.shape() == target.as_slice() {
        return Ok(field.to_host());
    }
    field.backend().broadcast_to(field.ndarray(), &target)
}

/// Along the dimension of the 1-d `mask`, takes `true_value` where the mask is set and
/// `false_value` elsewhere. Outside the mask dimension both values are restricted to
/// their common domain. Segments whose value does not cover them are trimmed at
/// either end; a gap inside the result is an error.
pub fn concat_where(
    mask: &Field,
    true_value: impl Into<Operand>,
    false_value: impl Into<Operand>,
) -> Result<Field> {
    if mask.ndim() != 1 {
        return Err(FieldError::unsupported(format!(
            "concat_where needs a 1-d mask, got domain {}",
            mask.domain()
        )));
    }
    let (true_value, false_value) = (true_value.into(), false_value.into());
    let backends: Vec<_> = [&true_value, &false_value]
        .into_iter()
        .filter_map(Operand::as_field)
        .map(Field::backend)
        .chain(Some(mask.backend()))
        .collect();
    common_backend(backends)?;

    let mask_range = mask.domain().named_ranges()[0].clone();
    let dim = mask_range.dim.clone();
    let dim_lists: Vec<Vec<Dimension>> = [Some(mask), true_value.as_field(), false_value.as_field()]
        .into_iter()
        .flatten()
        .map(|f| f.domain().dims())
        .collect();
    let dims = promote_dims(&dim_lists)?;

    let t = to_field(true_value, mask, &dims)?;
    let f = to_field(false_value, mask, &dims)?;
    let restricted = restrict_to_intersection(&[t.domain().clone(), f.domain().clone()], &[dim.clone()])?;
    let (t, f) = (t.restrict(&restricted[0])?, f.restrict(&restricted[1])?);

    let (start, _) = mask_range.range.finite_bounds()?;
    let len = mask_range.range.len()?;
    // a unit axis holds one value for the whole mask range
    let values = if mask.shape() == [len].as_slice() {
        mask.ndarray().to_typed::<bool>()
    } else {
        mask.backend().broadcast_to(mask.ndarray(), &[len])?.to_typed::<bool>()
    };
    let mut segments: Vec<(Domain, &Field)> = Vec::new();
    let mut pos = start;
    for (count, selected) in values.iter().copied().dedup_with_count() {
        let run = UnitRange::new(pos, pos + count as isize);
        pos += count as isize;
        let source = if selected { &t } else { &f };
        let covered = source
            .domain()
            .get(&dim)
            .map_or(UnitRange::empty(), |nr| nr.range.intersection(&run));
        segments.push((source.domain().replace_dim(&dim, covered)?, source));
    }

    let is_empty = |(d, _): &(Domain, &Field)| d.get(&dim).map_or(true, |nr| nr.range.is_empty());
    let lead = segments.iter().take_while(|s| is_empty(s)).count();
    let trail = segments.iter().rev().take_while(|s| is_empty(s)).count();
    let kept = if lead == segments.len() { &segments[..0] } else { &segments[lead..segments.len() - trail] };
    debug!(dim = %dim, runs = segments.len(), kept = kept.len(), "concat_where segments");

    if kept.is_empty() {
        let empty = Domain::from(dim.range(0..0));
        return Field::from_array(t.backend(), ArrayData::zeros(t.dtype(), &[0]), empty, None);
    }
    if let Some((d, _)) = kept.iter().find(|s| is_empty(s)) {
        return Err(FieldError::NonContiguousDomain(format!(
            "no value covers {} inside the concatenated domain",
            d
        )));
    }

    let domains: Vec<Domain> = kept.iter().map(|(d, _)| d.clone()).collect();
    let domain = stack_domains(&domains, &dim)?;
    let axis = domain
        .dim_index(&dim)
        .ok_or_else(|| FieldError::Internal(format!("dimension '{}' lost while stacking", dim)))?;
    let pieces = kept
        .iter()
        .map(|(d, source)| expand_to_domain(&source.restrict(d)?))
        .collect::<Result<Vec<_>>>()?;
    let data = t.backend().concatenate(&pieces, axis)?;
    Field::from_array(t.backend(), data, domain, None)
}
