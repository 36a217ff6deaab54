// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The value abstraction shared by every storage engine.
//!
//! A `Value` is a `ValueType`, a flat buffer of cells and an `Index` mapping
//! sparse addresses to subspaces. Cells are row-major within a dense
//! subspace and subspaces are concatenated in the order the index assigned
//! them. Values are created through a `ValueBuilder` obtained from a
//! `ValueBuilderFactory`; the factory is the only place a concrete engine is
//! chosen.

use std::collections::BTreeMap;

use half::bf16;
use smallvec::SmallVec;

use tensor_core::cell_type::{CellType, CellValue};
use tensor_core::common::Result;
use tensor_core::tensor_spec::{Address, Label, TensorSpec};
use tensor_core::type_err;
use tensor_core::value_type::ValueType;

/// Label buffer sized for the common case of a handful of mapped dimensions.
pub type Labels<'a> = SmallVec<[&'a str; 4]>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TypedCells<'a> {
    Double(&'a [f64]),
    Float(&'a [f32]),
    BFloat16(&'a [bf16]),
    Int8(&'a [i8]),
}

impl<'a> TypedCells<'a> {
    pub fn cell_type(&self) -> CellType {
        match self {
            TypedCells::Double(_) => CellType::Double,
            TypedCells::Float(_) => CellType::Float,
            TypedCells::BFloat16(_) => CellType::BFloat16,
            TypedCells::Int8(_) => CellType::Int8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedCells::Double(c) => c.len(),
            TypedCells::Float(c) => c.len(),
            TypedCells::BFloat16(c) => c.len(),
            TypedCells::Int8(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, idx: usize) -> f64 {
        match self {
            TypedCells::Double(c) => c[idx],
            TypedCells::Float(c) => c[idx] as f64,
            TypedCells::BFloat16(c) => c[idx].to_f64(),
            TypedCells::Int8(c) => c[idx] as f64,
        }
    }

    pub fn slice(&self, offset: usize, len: usize) -> TypedCells<'a> {
        let range = offset..offset + len;
        match *self {
            TypedCells::Double(c) => TypedCells::Double(&c[range]),
            TypedCells::Float(c) => TypedCells::Float(&c[range]),
            TypedCells::BFloat16(c) => TypedCells::BFloat16(&c[range]),
            TypedCells::Int8(c) => TypedCells::Int8(&c[range]),
        }
    }

    pub fn iter(self) -> impl Iterator<Item = f64> + 'a {
        (0..self.len()).map(move |i| self.get(i))
    }

    pub fn typify<T: Cell>(self) -> Option<&'a [T]> {
        T::typify(self)
    }
}

#[derive(Debug, PartialEq)]
pub enum TypedCellsMut<'a> {
    Double(&'a mut [f64]),
    Float(&'a mut [f32]),
    BFloat16(&'a mut [bf16]),
    Int8(&'a mut [i8]),
}

/// Cell types with a storage representation in `TypedCells`.
pub trait Cell: CellValue {
    fn typify(cells: TypedCells<'_>) -> Option<&[Self]>;
    fn typify_mut(cells: TypedCellsMut<'_>) -> Option<&mut [Self]>;
    fn wrap(cells: &[Self]) -> TypedCells<'_>;
    fn wrap_mut(cells: &mut [Self]) -> TypedCellsMut<'_>;
    fn create_builder(
        factory: &dyn ValueBuilderFactory,
        ty: &ValueType,
        num_mapped: usize,
        subspace_size: usize,
        expected_subspaces: usize,
    ) -> Box<dyn ValueBuilder<Self>>;
}

macro_rules! impl_cell {
    ($t:ty, $variant:ident, $create:ident) => {
        impl Cell for $t {
            fn typify(cells: TypedCells<'_>) -> Option<&[Self]> {
                match cells {
                    TypedCells::$variant(c) => Some(c),
                    _ => None,
                }
            }
            fn typify_mut(cells: TypedCellsMut<'_>) -> Option<&mut [Self]> {
                match cells {
                    TypedCellsMut::$variant(c) => Some(c),
                    _ => None,
                }
            }
            fn wrap(cells: &[Self]) -> TypedCells<'_> {
                TypedCells::$variant(cells)
            }
            fn wrap_mut(cells: &mut [Self]) -> TypedCellsMut<'_> {
                TypedCellsMut::$variant(cells)
            }
            fn create_builder(
                factory: &dyn ValueBuilderFactory,
                ty: &ValueType,
                num_mapped: usize,
                subspace_size: usize,
                expected_subspaces: usize,
            ) -> Box<dyn ValueBuilder<Self>> {
                factory.$create(ty, num_mapped, subspace_size, expected_subspaces)
            }
        }
    };
}

impl_cell!(f64, Double, create_builder_double);
impl_cell!(f32, Float, create_builder_float);
impl_cell!(bf16, BFloat16, create_builder_bfloat16);
impl_cell!(i8, Int8, create_builder_int8);

/// Run `$body` with `$t` bound to the storage type of cell type `$ct`.
#[macro_export]
macro_rules! with_cell_type {
    ($ct:expr, $t:ident => $body:expr) => {
        match $ct {
            ::tensor_core::cell_type::CellType::Double => {
                type $t = f64;
                $body
            }
            ::tensor_core::cell_type::CellType::Float => {
                type $t = f32;
                $body
            }
            ::tensor_core::cell_type::CellType::BFloat16 => {
                type $t = ::half::bf16;
                $body
            }
            ::tensor_core::cell_type::CellType::Int8 => {
                type $t = i8;
                $body
            }
        }
    };
}

/// Iteration over the subspaces matching a partial sparse address.
///
/// A view is created for a set of mapped dimension positions (strictly
/// increasing). `lookup` binds labels for those dimensions and restarts the
/// iteration; `next_result` then writes the labels of the remaining mapped
/// dimensions into `addr_out` and returns the subspace index. Every matching
/// subspace is produced exactly once per lookup.
pub trait IndexView<'a> {
    fn lookup(&mut self, addr: &[&str]);
    fn next_result(&mut self, addr_out: &mut [&'a str]) -> Option<usize>;
}

pub trait Index: Send + Sync {
    fn size(&self) -> usize;
    fn create_view<'a>(&'a self, dims: &[usize]) -> Box<dyn IndexView<'a> + 'a>;
}

pub trait Value: Send + Sync {
    fn value_type(&self) -> &ValueType;
    fn cells(&self) -> TypedCells<'_>;
    fn index(&self) -> &dyn Index;

    /// Mutable access to the cells of a value owned by the caller.
    fn cells_mut(&mut self) -> Option<TypedCellsMut<'_>> {
        None
    }

    /// Sum of all cells; the scalar reading of any value.
    fn as_double(&self) -> f64 {
        self.cells().iter().sum()
    }
}

pub trait ValueBuilder<T: Cell> {
    /// Allocate the next subspace for `addr` (labels in mapped dimension
    /// order) and return its zero-filled dense cells.
    fn add_subspace(&mut self, addr: &[&str]) -> &mut [T];
    fn build(self: Box<Self>) -> Box<dyn Value>;
}

pub trait ValueBuilderFactory: Send + Sync {
    fn name(&self) -> &'static str;
    fn create_builder_double(
        &self,
        ty: &ValueType,
        num_mapped: usize,
        subspace_size: usize,
        expected_subspaces: usize,
    ) -> Box<dyn ValueBuilder<f64>>;
    fn create_builder_float(
        &self,
        ty: &ValueType,
        num_mapped: usize,
        subspace_size: usize,
        expected_subspaces: usize,
    ) -> Box<dyn ValueBuilder<f32>>;
    fn create_builder_bfloat16(
        &self,
        ty: &ValueType,
        num_mapped: usize,
        subspace_size: usize,
        expected_subspaces: usize,
    ) -> Box<dyn ValueBuilder<bf16>>;
    fn create_builder_int8(
        &self,
        ty: &ValueType,
        num_mapped: usize,
        subspace_size: usize,
        expected_subspaces: usize,
    ) -> Box<dyn ValueBuilder<i8>>;
}

macro_rules! impl_value_builder_factory {
    ($factory:ty, $builder:ident, $name:expr) => {
        impl $crate::value::ValueBuilderFactory for $factory {
            fn name(&self) -> &'static str {
                $name
            }
            fn create_builder_double(
                &self,
                ty: &::tensor_core::value_type::ValueType,
                num_mapped: usize,
                subspace_size: usize,
                expected_subspaces: usize,
            ) -> Box<dyn $crate::value::ValueBuilder<f64>> {
                Box::new($builder::<f64>::new(ty, num_mapped, subspace_size, expected_subspaces))
            }
            fn create_builder_float(
                &self,
                ty: &::tensor_core::value_type::ValueType,
                num_mapped: usize,
                subspace_size: usize,
                expected_subspaces: usize,
            ) -> Box<dyn $crate::value::ValueBuilder<f32>> {
                Box::new($builder::<f32>::new(ty, num_mapped, subspace_size, expected_subspaces))
            }
            fn create_builder_bfloat16(
                &self,
                ty: &::tensor_core::value_type::ValueType,
                num_mapped: usize,
                subspace_size: usize,
                expected_subspaces: usize,
            ) -> Box<dyn $crate::value::ValueBuilder<::half::bf16>> {
                Box::new($builder::<::half::bf16>::new(
                    ty,
                    num_mapped,
                    subspace_size,
                    expected_subspaces,
                ))
            }
            fn create_builder_int8(
                &self,
                ty: &::tensor_core::value_type::ValueType,
                num_mapped: usize,
                subspace_size: usize,
                expected_subspaces: usize,
            ) -> Box<dyn $crate::value::ValueBuilder<i8>> {
                Box::new($builder::<i8>::new(ty, num_mapped, subspace_size, expected_subspaces))
            }
        }
    };
}

pub(crate) use impl_value_builder_factory;

/// Builder for `ty` with storage type `T`, which must match the cell type.
pub fn create_value_builder<T: Cell>(
    factory: &dyn ValueBuilderFactory,
    ty: &ValueType,
    expected_subspaces: usize,
) -> Box<dyn ValueBuilder<T>> {
    debug_assert_eq!(T::CELL_TYPE, ty.cell_type());
    T::create_builder(
        factory,
        ty,
        ty.count_mapped_dimensions(),
        ty.dense_subspace_size(),
        expected_subspaces,
    )
}

/// Index of a value with no mapped dimensions: exactly one subspace.
pub struct TrivialIndex;

pub static TRIVIAL_INDEX: TrivialIndex = TrivialIndex;

struct TrivialView {
    pending: bool,
}

impl<'a> IndexView<'a> for TrivialView {
    fn lookup(&mut self, addr: &[&str]) {
        debug_assert!(addr.is_empty());
        self.pending = true;
    }

    fn next_result(&mut self, _addr_out: &mut [&'a str]) -> Option<usize> {
        if std::mem::take(&mut self.pending) {
            Some(0)
        } else {
            None
        }
    }
}

impl Index for TrivialIndex {
    fn size(&self) -> usize {
        1
    }

    fn create_view<'a>(&'a self, dims: &[usize]) -> Box<dyn IndexView<'a> + 'a> {
        debug_assert!(dims.is_empty());
        Box::new(TrivialView { pending: false })
    }
}

pub struct DoubleValue {
    ty: ValueType,
    value: [f64; 1],
}

impl DoubleValue {
    pub fn new(value: f64) -> Self {
        DoubleValue {
            ty: ValueType::double(),
            value: [value],
        }
    }
}

impl Value for DoubleValue {
    fn value_type(&self) -> &ValueType {
        &self.ty
    }
    fn cells(&self) -> TypedCells<'_> {
        TypedCells::Double(&self.value)
    }
    fn index(&self) -> &dyn Index {
        &TRIVIAL_INDEX
    }
    fn cells_mut(&mut self) -> Option<TypedCellsMut<'_>> {
        Some(TypedCellsMut::Double(&mut self.value))
    }
}

/// A borrowed dense value, used to hand one subspace of a larger value to a
/// nested function.
pub struct DenseValueView<'a> {
    ty: &'a ValueType,
    cells: TypedCells<'a>,
}

impl<'a> DenseValueView<'a> {
    pub fn new(ty: &'a ValueType, cells: TypedCells<'a>) -> Self {
        debug_assert_eq!(0, ty.count_mapped_dimensions());
        debug_assert_eq!(ty.dense_subspace_size(), cells.len());
        DenseValueView { ty, cells }
    }
}

impl Value for DenseValueView<'_> {
    fn value_type(&self) -> &ValueType {
        self.ty
    }
    fn cells(&self) -> TypedCells<'_> {
        self.cells
    }
    fn index(&self) -> &dyn Index {
        &TRIVIAL_INDEX
    }
}

/// Cells of subspace `subspace` of `value`.
pub fn subspace_cells(value: &dyn Value, subspace: usize) -> TypedCells<'_> {
    let size = value.value_type().dense_subspace_size();
    value.cells().slice(subspace * size, size)
}

/// Visit every subspace of `value` with its full sparse address.
pub fn for_each_subspace<'a, F>(value: &'a dyn Value, mut f: F)
where
    F: FnMut(&[&'a str], usize),
{
    let num_mapped = value.value_type().count_mapped_dimensions();
    let mut addr: Labels<'a> = SmallVec::from_elem("", num_mapped);
    let mut view = value.index().create_view(&[]);
    view.lookup(&[]);
    while let Some(subspace) = view.next_result(&mut addr) {
        f(&addr[..], subspace);
    }
}

fn copy_cells<T: Cell>(value: &dyn Value, factory: &dyn ValueBuilderFactory) -> Box<dyn Value> {
    let ty = value.value_type();
    let mut builder = create_value_builder::<T>(factory, ty, value.index().size());
    let cells = value.cells();
    let size = ty.dense_subspace_size();
    for_each_subspace(value, |addr, subspace| {
        let dst = builder.add_subspace(addr);
        match cells.typify::<T>() {
            Some(src) => dst.copy_from_slice(&src[subspace * size..(subspace + 1) * size]),
            None => {
                for (i, cell) in dst.iter_mut().enumerate() {
                    *cell = T::from_f64(cells.get(subspace * size + i));
                }
            }
        }
    });
    builder.build()
}

/// Copy `value` into a value built by `factory`.
pub fn copy_value(value: &dyn Value, factory: &dyn ValueBuilderFactory) -> Box<dyn Value> {
    with_cell_type!(value.value_type().cell_type(), T => copy_cells::<T>(value, factory))
}

pub fn spec_from_value(value: &dyn Value) -> TensorSpec {
    let ty = value.value_type();
    let mut spec = TensorSpec::new(&ty.to_spec());
    let mapped = ty.mapped_dimensions();
    let indexed = ty.indexed_dimensions();
    let size = ty.dense_subspace_size();
    let cells = value.cells();
    for_each_subspace(value, |addr, subspace| {
        let mut sparse = Address::new();
        for (dim, label) in mapped.iter().zip(addr.iter()) {
            sparse.insert(dim.name.clone(), Label::from(*label));
        }
        for offset in 0..size {
            let mut full = sparse.clone();
            let mut rest = offset;
            for dim in indexed.iter().rev() {
                let dim_size = dim.size as usize;
                full.insert(dim.name.clone(), Label::Index((rest % dim_size) as u32));
                rest /= dim_size;
            }
            spec.insert(full, cells.get(subspace * size + offset));
        }
    });
    spec
}

fn build_from_spec<T: Cell>(
    spec: &TensorSpec,
    ty: &ValueType,
    factory: &dyn ValueBuilderFactory,
) -> Box<dyn Value> {
    let mapped = ty.mapped_dimensions();
    let indexed = ty.indexed_dimensions();
    let mut subspaces: BTreeMap<Vec<String>, Vec<(usize, f64)>> = BTreeMap::new();
    'cells: for (addr, value) in spec.cells() {
        if addr.len() != ty.dimensions().len() {
            continue;
        }
        let mut labels = Vec::with_capacity(mapped.len());
        for dim in mapped.iter() {
            match addr.get(&dim.name) {
                Some(Label::Name(name)) => labels.push(name.clone()),
                _ => continue 'cells,
            }
        }
        let mut offset = 0;
        for dim in indexed.iter() {
            match addr.get(&dim.name) {
                Some(Label::Index(idx)) if *idx < dim.size => {
                    offset = offset * dim.size as usize + *idx as usize;
                }
                _ => continue 'cells,
            }
        }
        subspaces.entry(labels).or_default().push((offset, *value));
    }

    let mut builder = create_value_builder::<T>(factory, ty, subspaces.len());
    for (labels, cells) in subspaces.iter() {
        let addr: Labels = labels.iter().map(|s| s.as_str()).collect();
        let dst = builder.add_subspace(&addr);
        for (offset, value) in cells {
            dst[*offset] = T::from_f64(*value);
        }
    }
    builder.build()
}

/// Build a value from its spec. Cells whose address does not fit the type
/// are ignored.
pub fn value_from_spec(spec: &TensorSpec, factory: &dyn ValueBuilderFactory) -> Result<Box<dyn Value>> {
    let ty = spec.value_type();
    if ty.is_error() {
        return type_err!(ErrorType, format!("bad tensor type '{}'", spec.type_spec()));
    }
    Ok(with_cell_type!(ty.cell_type(), T => build_from_spec::<T>(spec, &ty, factory)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::tensor_spec::address;

    #[test]
    fn typed_cells_access() {
        let cells = [1.0f32, 2.5, -3.0];
        let typed = f32::wrap(&cells);
        assert_eq!(CellType::Float, typed.cell_type());
        assert_eq!(3, typed.len());
        assert_eq!(2.5, typed.get(1));
        assert_eq!(vec![2.5, -3.0], typed.slice(1, 2).iter().collect::<Vec<_>>());
        assert_eq!(Some(&cells[..]), typed.typify::<f32>());
        assert_eq!(None, typed.typify::<f64>());
    }

    #[test]
    fn trivial_index_yields_one_subspace_per_lookup() {
        let mut view = TRIVIAL_INDEX.create_view(&[]);
        assert_eq!(None, view.next_result(&mut []));
        view.lookup(&[]);
        assert_eq!(Some(0), view.next_result(&mut []));
        assert_eq!(None, view.next_result(&mut []));
        view.lookup(&[]);
        assert_eq!(Some(0), view.next_result(&mut []));
    }

    #[test]
    fn double_value() {
        let value = DoubleValue::new(3.5);
        assert!(value.value_type().is_double());
        assert_eq!(3.5, value.as_double());
        let spec = spec_from_value(&value);
        assert_eq!(TensorSpec::new("double").add(address(&[]), 3.5), spec);
    }

    #[test]
    fn dense_view_sums_cells() {
        let ty = ValueType::from_spec("tensor<int8>(x[3])");
        let cells = [1i8, -2, 4];
        let view = DenseValueView::new(&ty, i8::wrap(&cells));
        assert_eq!(3.0, view.as_double());
        assert_eq!(1, view.index().size());
    }
}
