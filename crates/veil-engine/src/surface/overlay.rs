/// UI overlay drawn on top of a surface's finished scene.
///
/// `push_frame` calls `begin_frame`, `render` and `end_frame` in that order,
/// after the scene and the OIT resolve were encoded and before present.
pub trait Overlay {
    fn begin_frame(&mut self) {}

    /// Records overlay passes into `encoder`, targeting `view`.
    fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
    );

    fn end_frame(&mut self) {}
}
