#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockMetrics {
    pub block_index: usize,
    pub line_count: usize,
    pub token_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderMetrics {
    pub blocks: Vec<BlockMetrics>,
    pub font_count: usize,
    pub qr_modules: usize,
    pub paint_count: usize,
    pub layout_ms: f64,
}

impl RenderMetrics {
    pub fn line_count(&self) -> usize {
        self.blocks.iter().map(|b| b.line_count).sum()
    }

    pub fn token_count(&self) -> usize {
        self.blocks.iter().map(|b| b.token_count).sum()
    }
}
