//! Small meshes shared by the unit tests.

use std::collections::HashMap;

use chisel_mesh::WingedMesh;
use glam::Vec3;

/// Two triangles covering the unit square in the XZ plane, facing +Y.
pub fn unit_square() -> WingedMesh {
    let positions = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 0.0, 1.0],
        [0.0, 0.0, 1.0],
    ];
    WingedMesh::from_indexed(&positions, &[0, 2, 1, 0, 3, 2]).unwrap()
}

/// `n` x `n` quads spanning `[-half, half]` in X and Z, facing +Y.
///
/// Vertex `(i, j)` has id `j * (n + 1) + i`, with `i` counting along X
/// and `j` along Z. Diagonals in the x < 0 half mirror those in the x > 0
/// half, so for even `n` the connectivity is symmetric about x = 0.
pub fn grid(n: usize, half: f32) -> WingedMesh {
    let coord = |k: usize| -half + 2.0 * half * (k as f32 / n as f32);
    let mut positions = Vec::new();
    for j in 0..=n {
        for i in 0..=n {
            positions.push([coord(i), 0.0, coord(j)]);
        }
    }
    let id = |i: usize, j: usize| (j * (n + 1) + i) as u32;
    let mut indices = Vec::new();
    for j in 0..n {
        for i in 0..n {
            let (a, b, c, d) = (id(i, j), id(i + 1, j), id(i, j + 1), id(i + 1, j + 1));
            if 2 * i + 1 < n {
                indices.extend_from_slice(&[a, c, b, b, c, d]);
            } else {
                indices.extend_from_slice(&[a, d, b, a, c, d]);
            }
        }
    }
    WingedMesh::from_indexed(&positions, &indices).unwrap()
}

/// Unit icosphere with `subdivisions` rounds of midpoint refinement.
/// Symmetric about the three coordinate planes.
pub fn icosphere(subdivisions: usize) -> WingedMesh {
    let t = (1.0 + 5.0f32.sqrt()) * 0.5;
    let mut positions: Vec<Vec3> = [
        [-1.0, t, 0.0],
        [1.0, t, 0.0],
        [-1.0, -t, 0.0],
        [1.0, -t, 0.0],
        [0.0, -1.0, t],
        [0.0, 1.0, t],
        [0.0, -1.0, -t],
        [0.0, 1.0, -t],
        [t, 0.0, -1.0],
        [t, 0.0, 1.0],
        [-t, 0.0, -1.0],
        [-t, 0.0, 1.0],
    ]
    .into_iter()
    .map(|p| Vec3::from(p).normalize())
    .collect();

    let mut faces: Vec<[u32; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
        let mut midpoint = |a: u32, b: u32, positions: &mut Vec<Vec3>| {
            let key = (a.min(b), a.max(b));
            *midpoints.entry(key).or_insert_with(|| {
                let p = ((positions[a as usize] + positions[b as usize]) * 0.5).normalize();
                positions.push(p);
                (positions.len() - 1) as u32
            })
        };
        let mut next = Vec::with_capacity(faces.len() * 4);
        for [a, b, c] in faces {
            let ab = midpoint(a, b, &mut positions);
            let bc = midpoint(b, c, &mut positions);
            let ca = midpoint(c, a, &mut positions);
            next.extend_from_slice(&[[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]);
        }
        faces = next;
    }

    let positions: Vec<[f32; 3]> = positions.into_iter().map(|p| p.to_array()).collect();
    let indices: Vec<u32> = faces.into_iter().flatten().collect();
    WingedMesh::from_indexed(&positions, &indices).unwrap()
}

/// Whether every vertex has a partner within `tolerance` of its reflection
/// across the plane x = 0.
pub fn is_mirror_symmetric_x(mesh: &WingedMesh, tolerance: f32) -> bool {
    let points: Vec<Vec3> = mesh.vertex_ids().filter_map(|v| mesh.position(v)).collect();
    points.iter().all(|p| {
        let mirrored = Vec3::new(-p.x, p.y, p.z);
        points.iter().any(|q| q.distance(mirrored) <= tolerance)
    })
}
