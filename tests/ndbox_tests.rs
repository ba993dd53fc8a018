use bytemuck::Pod;
use ndbox::{Device, Element, ElementType, ErrorKind, NdBox};
use rand::{Rng, SeedableRng, rngs::StdRng};

fn random_shape(rng: &mut StdRng, rank: usize) -> Vec<usize> {
    (0..rank).map(|_| rng.random_range(1..5)).collect()
}

fn random_payload(rng: &mut StdRng, ty: ElementType, count: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; count * ty.byte_width()];
    if ty == ElementType::Bool {
        for b in bytes.iter_mut() {
            *b = rng.random_range(0..2);
        }
    } else {
        rng.fill(&mut bytes[..]);
    }
    bytes
}

fn check_pod<T: Element + Pod>(b: &NdBox, bytes: &[u8]) {
    let width = T::TYPE.byte_width();
    for (linear, index) in b.indices().enumerate() {
        let value = b.at::<T>(&index).unwrap();
        let offset = linear * width;
        assert_eq!(
            bytemuck::bytes_of(value),
            &bytes[offset..offset + width],
            "{} at {:?}",
            T::TYPE,
            index
        );
    }
}

fn check_bool(b: &NdBox, bytes: &[u8]) {
    for (linear, index) in b.indices().enumerate() {
        assert_eq!(b.get::<bool>(&index).unwrap(), bytes[linear] != 0);
    }
}

fn check_round_trip(b: &NdBox, bytes: &[u8]) {
    match b.element_type() {
        ElementType::Bool => check_bool(b, bytes),
        ElementType::Int8 => check_pod::<i8>(b, bytes),
        ElementType::Int16 => check_pod::<i16>(b, bytes),
        ElementType::Int32 => check_pod::<i32>(b, bytes),
        ElementType::Int64 => check_pod::<i64>(b, bytes),
        ElementType::UInt8 => check_pod::<u8>(b, bytes),
        ElementType::UInt16 => check_pod::<u16>(b, bytes),
        ElementType::UInt32 => check_pod::<u32>(b, bytes),
        ElementType::UInt64 => check_pod::<u64>(b, bytes),
        ElementType::Float32 => check_pod::<f32>(b, bytes),
        ElementType::Float64 => check_pod::<f64>(b, bytes),
        ElementType::Unknown => unreachable!(),
    }
}

#[test]
fn round_trip_every_type_up_to_rank_4() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for ty in ElementType::ALL {
        for rank in 0..=4 {
            let shape = random_shape(&mut rng, rank);
            let mut b = NdBox::new();
            b.allocate(ty, Device::CPU, &shape).unwrap();

            let bytes = random_payload(&mut rng, ty, b.size());
            b.set_data(&bytes).unwrap();

            check_round_trip(&b, &bytes);
            assert_eq!(b.get_data().unwrap(), bytes);
        }
    }
}

#[test]
fn round_trip_with_uneven_strides() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut b = NdBox::new();
    b.allocate(ElementType::Int16, Device::CPU, &[2, 3, 5, 1]).unwrap();
    assert_eq!(b.strides(), &[30, 10, 2, 2]);

    let bytes = random_payload(&mut rng, ElementType::Int16, b.size());
    b.set_data(&bytes).unwrap();
    check_round_trip(&b, &bytes);
}

#[test]
fn size_matches_shape_and_fits_capacity() {
    let mut rng = StdRng::seed_from_u64(9);
    for _ in 0..50 {
        let rank = rng.random_range(0..=ndbox::MAX_RANK);
        let shape: Vec<usize> = (0..rank).map(|_| rng.random_range(0..4)).collect();
        let ty = ElementType::ALL[rng.random_range(0..ElementType::ALL.len())];

        let mut b = NdBox::new();
        b.allocate(ty, Device::CPU, &shape).unwrap();
        assert_eq!(b.size(), ndbox::container::layout::element_count(&shape).unwrap());
        assert!(b.capacity() >= b.size() * ty.byte_width());
        assert_eq!(b.offsets().len(), b.size());
    }
}

#[test]
fn scalar_box() {
    let mut b = NdBox::new();
    b.allocate(ElementType::Int32, Device::CPU, &[]).unwrap();
    assert_eq!(b.rank(), 0);
    assert_eq!(b.size(), 1);

    b.set_data(&(-123i32).to_ne_bytes()).unwrap();
    assert_eq!(*b.at::<i32>(&[]).unwrap(), -123);
    assert_eq!(b.offsets().collect::<Vec<_>>(), vec![0]);
}

#[test]
fn out_of_range_access() {
    let mut b = NdBox::new();
    b.allocate(ElementType::Int8, Device::CPU, &[4]).unwrap();
    assert_eq!(b.at::<i8>(&[4]).unwrap_err().kind(), ErrorKind::OutOfRange);
    assert_eq!(b.at::<i8>(&[3]).copied().unwrap(), 0);
    assert_eq!(b.at::<i8>(&[0, 0]).unwrap_err().kind(), ErrorKind::OutOfRange);
}

#[test]
fn access_on_empty_box_is_invalid_state() {
    let b = NdBox::new();
    assert_eq!(b.at::<u8>(&[]).unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(b.cursor(0, 0, None, 1).unwrap_err().kind(), ErrorKind::InvalidState);
}

#[test]
fn clear_is_idempotent() {
    let mut fresh = NdBox::new();
    fresh.clear();
    fresh.clear();
    assert_eq!(fresh.rank(), 0);
    assert_eq!(fresh.size(), 0);

    let mut b = NdBox::zeros(ElementType::Float64, Device::CPU, &[3, 3]).unwrap();
    b.clear();
    b.clear();
    assert_eq!(b.rank(), 0);
    assert_eq!(b.size(), 0);
    assert!(!b.is_bound());
}

#[test]
fn cpu_to_cpu_copy_is_independent() {
    let data: Vec<u8> = (0..100).collect();
    let mut a = NdBox::from_slice(&[100], &data).unwrap();
    let b = a.device_copy(Device::CPU).unwrap();

    assert_eq!(a.get_data().unwrap(), b.get_data().unwrap());
    assert_ne!(a.as_bytes().unwrap().as_ptr(), b.as_bytes().unwrap().as_ptr());

    a.set::<u8>(&[0], 200).unwrap();
    assert_eq!(b.get::<u8>(&[0]).unwrap(), 0);
    assert_eq!(a.get::<u8>(&[0]).unwrap(), 200);
}

#[test]
fn cursor_over_columns() {
    let data: Vec<i32> = (0..12).collect();
    let b = NdBox::from_slice(&[3, 4], &data).unwrap();

    let column: Vec<i32> = b
        .cursor(0, 0, None, 1)
        .unwrap()
        .map(|offset| offset + 2 * 4)
        .map(|offset| i32::read_ne(&b.as_bytes().unwrap()[offset..offset + 4]))
        .collect();
    assert_eq!(column, vec![2, 6, 10]);

    let rows = b.cursor(0, -1, None, -1).unwrap();
    let mut reversed = Vec::new();
    for row in rows.clone() {
        for offset in rows.sub_cursor(row, 1, -1, None, -2).unwrap() {
            reversed.push(i32::read_ne(&b.as_bytes().unwrap()[offset..offset + 4]));
        }
    }
    assert_eq!(reversed, vec![11, 9, 7, 5, 3, 1]);
}

#[test]
fn values_iterate_in_row_major_order() {
    let b = NdBox::from_slice(&[2, 2, 2], &[1u16, 2, 3, 4, 5, 6, 7, 8]).unwrap();
    let mut values = b.values::<u16>().unwrap();
    assert_eq!(values.len(), 8);
    assert_eq!(values.by_ref().take(3).collect::<Vec<_>>(), vec![1, 2, 3]);
    values.reset();
    assert_eq!(values.sum::<u16>(), 36);
}

#[test]
fn cast_round_trip_through_float() {
    let b = NdBox::from_slice(&[4], &[-3i8, -1, 0, 127]).unwrap();
    let f = b.cast(ElementType::Float64).unwrap();
    assert_eq!(f.values::<f64>().unwrap().collect::<Vec<_>>(), vec![-3.0, -1.0, 0.0, 127.0]);
    let back = f.cast(ElementType::Int8).unwrap();
    assert_eq!(back.get_data().unwrap(), b.get_data().unwrap());
}

#[test]
fn display_matches_contents() {
    let b = NdBox::from_slice(&[3], &[1i32, 2, 3]).unwrap();
    assert_eq!(format!("{b}"), "box([1, 2, 3])");
}
