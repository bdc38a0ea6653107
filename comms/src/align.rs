/// Element types of a receive buffer whose start is suitable for borrowing `f32` payloads.
pub trait Align4: bytemuck::Pod {}

impl Align4 for u32 {}
impl Align4 for u64 {}
impl Align4 for f32 {}
impl Align4 for f64 {}
