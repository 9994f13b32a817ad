pub fn is_power_2(num: u64) -> bool {
    return num != 0 && ((num & (num - 1)) == 0);
}

#[inline]
pub fn in_range_inclusive<T: PartialOrd>(val: T, start: T, stop: T) -> bool {
    val >= start && val <= stop
}
